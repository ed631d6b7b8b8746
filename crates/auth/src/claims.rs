use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use netdesk_core::{OrganizationId, UserId};

use crate::Permission;

/// Which half of a token pair a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Signed token payload.
///
/// Both halves of a pair carry the full subject so a refresh can mint a new
/// access token without touching storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub is_super_admin: bool,
    pub is_staff: bool,
    pub login_id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    pub token_type: TokenKind,
    /// Unique token id; the blacklist is keyed on it.
    pub jti: Uuid,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

impl Claims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Check the time window of already-decoded claims against `now`.
///
/// Signature checks happen in the token service; this is the pure part so
/// expiry can be tested against a simulated clock.
pub fn validate_claims(claims: &Claims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(iat: i64, exp: i64) -> Claims {
        Claims {
            user_id: UserId::new(),
            organization_id: OrganizationId::new(),
            is_super_admin: false,
            is_staff: false,
            login_id: "ktl_admin".into(),
            email: "admin@ktl.io".into(),
            name: "Admin".into(),
            permissions: vec![],
            token_type: TokenKind::Access,
            jti: Uuid::now_v7(),
            iat,
            exp,
        }
    }

    #[test]
    fn window_edges() {
        let now = Utc::now();
        let t = now.timestamp();

        assert_eq!(validate_claims(&claims(t, t + 60), now), Ok(()));
        assert_eq!(
            validate_claims(&claims(t - 60, t), now),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&claims(t + 10, t + 60), now),
            Err(TokenValidationError::NotYetValid)
        );
        assert_eq!(
            validate_claims(&claims(t, t), now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn token_type_is_lowercase_on_the_wire() {
        let json = serde_json::to_value(claims(1, 2)).unwrap();
        assert_eq!(json["token_type"], "access");
    }
}
