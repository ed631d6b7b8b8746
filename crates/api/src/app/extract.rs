//! Extractors whose rejections use the JSON error envelope.

use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use netdesk_core::DomainError;

use super::errors::{ApiError, ApiResult};

/// `Json<T>` with a 400 envelope on malformed bodies.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(DomainError::validation(rejection.body_text()))),
        }
    }
}

/// `Query<T>` with a 400 envelope on malformed query strings.
pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(DomainError::validation(rejection.body_text()))),
        }
    }
}

/// Decode a body that may be absent altogether.
pub fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError(DomainError::validation(format!("Invalid JSON body: {e}"))))
}

/// Parse a path identifier; garbage is a 400, not a 404.
pub fn parse_id<T>(raw: &str) -> ApiResult<T>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(ApiError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use netdesk_core::UserId;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Body {
        #[serde(default)]
        refresh_token: Option<String>,
    }

    #[test]
    fn empty_body_is_default() {
        assert_eq!(optional_json::<Body>(&Bytes::new()).unwrap(), Body::default());
        assert_eq!(optional_json::<Body>(&Bytes::from_static(b"  \n")).unwrap(), Body::default());
        let parsed: Body = optional_json(&Bytes::from_static(br#"{"refresh_token":"r"}"#)).unwrap();
        assert_eq!(parsed.refresh_token.as_deref(), Some("r"));
        assert!(optional_json::<Body>(&Bytes::from_static(b"{oops")).is_err());
    }

    #[test]
    fn bad_ids_are_invalid_id_errors() {
        let err = parse_id::<UserId>("nope").err().unwrap();
        assert!(matches!(err.0, DomainError::InvalidId(_)));
        assert!(parse_id::<UserId>(&UserId::new().to_string()).is_ok());
    }
}
