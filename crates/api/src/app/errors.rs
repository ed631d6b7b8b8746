//! Consistent JSON error responses.

use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use netdesk_core::DomainError;

/// A `DomainError` on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        Self(value)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn status_for(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => StatusCode::BAD_REQUEST,
        DomainError::Authentication(_) => StatusCode::UNAUTHORIZED,
        DomainError::Authorization(_) => StatusCode::FORBIDDEN,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::ServiceCommunication(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

const INTERNAL_CODE: &str = "internal_error";
const GENERIC_MESSAGE: &str = "An unexpected error occurred";

/// Detail of an internal failure, attached to the masked response so the
/// development-only [`reveal_internal_detail`] layer can put it back.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        match self.0 {
            DomainError::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                let mut response = json_error(status, INTERNAL_CODE, GENERIC_MESSAGE);
                response.extensions_mut().insert(InternalDetail(detail));
                response
            }
            other => json_error(status, other.code(), other.to_string()),
        }
    }
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Response mapper installed in development: internal failures carry their
/// underlying message instead of the generic one.
pub async fn reveal_internal_detail(mut response: Response) -> Response {
    match response.extensions_mut().remove::<InternalDetail>() {
        Some(InternalDetail(detail)) => json_error(response.status(), INTERNAL_CODE, detail),
        None => response,
    }
}

/// Body for a panic caught by `CatchPanicLayer`; the panic text is exposed
/// only in development.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>, expose_detail: bool) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(%detail, "handler panicked");

    let message = if expose_detail {
        detail
    } else {
        GENERIC_MESSAGE.to_string()
    };
    json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_CODE, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::invalid_id("x"), StatusCode::BAD_REQUEST),
            (DomainError::authentication("x"), StatusCode::UNAUTHORIZED),
            (DomainError::authorization("x"), StatusCode::FORBIDDEN),
            (DomainError::not_found("x"), StatusCode::NOT_FOUND),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
            (DomainError::service("x"), StatusCode::SERVICE_UNAVAILABLE),
            (DomainError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{err:?}");
        }
    }

    #[tokio::test]
    async fn envelope_carries_code_and_message() {
        let response = ApiError(DomainError::conflict("Role with this name already exists in this organization"))
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], DomainError::conflict("x").code());
        assert_eq!(
            body["message"],
            "Role with this name already exists in this organization"
        );
    }

    #[tokio::test]
    async fn internal_details_are_hidden_until_revealed() {
        let masked = ApiError(DomainError::internal("pool exploded")).into_response();
        assert!(masked.extensions().get::<InternalDetail>().is_some());

        let revealed = body_json(reveal_internal_detail(masked).await).await;
        assert_eq!(revealed["error"], "internal_error");
        assert_eq!(revealed["message"], "pool exploded");

        let prod = body_json(ApiError(DomainError::internal("pool exploded")).into_response()).await;
        assert_eq!(prod["error"], "internal_error");
        assert_eq!(prod["message"], "An unexpected error occurred");
    }

    #[tokio::test]
    async fn other_errors_pass_the_reveal_layer_untouched() {
        let response = reveal_internal_detail(ApiError(DomainError::not_found("User not found")).into_response()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "User not found");
    }

    #[tokio::test]
    async fn panic_detail_only_in_development() {
        let dev = body_json(panic_response(Box::new("boom"), true)).await;
        assert_eq!(dev["error"], "internal_error");
        assert_eq!(dev["message"], "boom");

        let prod = body_json(panic_response(Box::new(String::from("boom")), false)).await;
        assert_eq!(prod["error"], "internal_error");
        assert_eq!(prod["message"], "An unexpected error occurred");
    }
}
