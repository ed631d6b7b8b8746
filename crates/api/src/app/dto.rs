//! Request/response DTOs and the success envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use netdesk_auth::{OrgScope, RoleFilter, TokenPair, UserFilter, UserView};
use netdesk_core::OrganizationId;
use netdesk_organizations::{OrgType, OrganizationFilter};

#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

fn envelope<T: Serialize>(status: StatusCode, message: Option<String>, data: Option<T>) -> Response {
    (
        status,
        Json(Envelope {
            success: true,
            message,
            data,
        }),
    )
        .into_response()
}

pub fn ok<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::OK, None, Some(data))
}

pub fn ok_with_message<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    envelope(StatusCode::OK, Some(message.into()), Some(data))
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    envelope(StatusCode::CREATED, Some(message.into()), Some(data))
}

pub fn message(message: impl Into<String>) -> Response {
    envelope::<()>(StatusCode::OK, Some(message.into()), None)
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access: String,
    pub refresh: String,
    pub token_type: &'static str,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access: pair.access,
            refresh: pair.refresh,
            token_type: "Bearer",
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserView,
    pub tokens: TokenResponse,
    pub remember_me: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: UserView,
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub organization_id: Option<OrganizationId>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_super_admin: Option<bool>,
    pub search: Option<String>,
}

impl UserQuery {
    /// Scope is filled in by the service from the caller.
    pub fn into_filter(self) -> UserFilter {
        UserFilter {
            organization_id: self.organization_id,
            is_active: self.is_active,
            is_staff: self.is_staff,
            is_super_admin: self.is_super_admin,
            search: self.search.filter(|s| !s.trim().is_empty()),
            ..UserFilter::scoped(OrgScope::All)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RoleQuery {
    pub organization_id: Option<OrganizationId>,
    pub is_active: Option<bool>,
    pub is_system_role: Option<bool>,
    pub level: Option<u32>,
    pub search: Option<String>,
}

impl RoleQuery {
    pub fn into_filter(self) -> RoleFilter {
        RoleFilter {
            organization_id: self.organization_id,
            is_active: self.is_active,
            is_system_role: self.is_system_role,
            level: self.level,
            search: self.search.filter(|s| !s.trim().is_empty()),
            ..RoleFilter::scoped(OrgScope::All)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OrganizationQuery {
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub org_type: Option<OrgType>,
    pub search: Option<String>,
}

impl OrganizationQuery {
    pub fn into_filter(self) -> OrganizationFilter {
        OrganizationFilter {
            is_active: self.is_active,
            is_verified: self.is_verified,
            org_type: self.org_type,
            search: self.search.filter(|s| !s.trim().is_empty()),
            ..OrganizationFilter::scoped(OrgScope::All)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_search_is_ignored() {
        let filter = UserQuery {
            search: Some("  ".into()),
            is_active: Some(true),
            ..Default::default()
        }
        .into_filter();
        assert_eq!(filter.search, None);
        assert_eq!(filter.is_active, Some(true));
    }

    #[test]
    fn token_pair_is_labelled_bearer() {
        let now = Utc::now();
        let response = TokenResponse::from(TokenPair {
            access: "a".into(),
            refresh: "r".into(),
            access_expires_at: now,
            refresh_expires_at: now,
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["access"], "a");
    }
}
