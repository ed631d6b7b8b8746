use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use netdesk_auth::{AuthorizationGuard, Identity};

use crate::app::errors::ApiError;
use crate::context::RequestIdentity;

#[derive(Clone)]
pub struct AuthState {
    pub guard: Arc<AuthorizationGuard>,
}

/// Resolve the bearer token (if any) into a [`RequestIdentity`].
///
/// Never rejects on its own: bad or revoked tokens resolve to anonymous and
/// the handler's extractor decides. The one exception is a blacklist outage
/// while failing closed, which answers 503 here.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let bearer = extract_bearer(req.headers()).map(str::to_string);

    let identity = match state.guard.resolve(bearer.as_deref()).await {
        Ok(identity) => identity,
        Err(err) => return ApiError(err).into_response(),
    };

    let context = match identity {
        Identity::Anonymous => RequestIdentity::anonymous(),
        authenticated => RequestIdentity {
            identity: authenticated,
            bearer,
        },
    };
    req.extensions_mut().insert(context);

    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(extract_bearer(&headers("Bearer   abc  ")), Some("abc"));
        assert_eq!(extract_bearer(&headers("Basic dXNlcjpwdw==")), None);
        assert_eq!(extract_bearer(&headers("Bearer ")), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }
}
