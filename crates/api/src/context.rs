use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use netdesk_auth::{Identity, Principal};
use netdesk_core::DomainError;

use crate::app::errors::ApiError;

/// Who is calling, as resolved by the auth middleware.
///
/// Present on every request that passed through the middleware; anonymous
/// callers carry `Identity::Anonymous` and no token.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub identity: Identity,
    pub bearer: Option<String>,
}

impl RequestIdentity {
    pub fn anonymous() -> Self {
        Self {
            identity: Identity::Anonymous,
            bearer: None,
        }
    }
}

/// Extractor for handlers that require a verified, unrevoked access token.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal: Principal,
    /// The raw access token, needed to revoke it on logout.
    pub token: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<RequestIdentity>() {
            Some(RequestIdentity {
                identity: Identity::Authenticated(principal),
                bearer: Some(token),
            }) => Ok(Self {
                principal: principal.clone(),
                token: token.clone(),
            }),
            _ => Err(ApiError(DomainError::authentication(
                "Authentication credentials were not provided or are invalid",
            ))),
        }
    }
}
