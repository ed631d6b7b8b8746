//! Signed session tokens: issue, verify, rotate, revoke.
//!
//! Tokens are HS256 JWTs. Expiry is checked against the injected clock rather
//! than by `jsonwebtoken` itself so lifetimes behave under simulated time.
//! Rotation is one-time-use: a refresh token's `jti` is inserted into the
//! blacklist with insert-if-absent semantics before a new pair is minted, so
//! of several concurrent refreshes with the same token exactly one succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use thiserror::Error;
use uuid::Uuid;

use netdesk_core::{Clock, DomainError, OrganizationId, UserId};

use crate::claims::{Claims, TokenKind, TokenValidationError, validate_claims};
use crate::user::User;
use crate::Permission;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error(transparent)]
    Window(#[from] TokenValidationError),

    #[error("expected a {expected:?} token, got {found:?}")]
    WrongKind { expected: TokenKind, found: TokenKind },

    #[error("token has been revoked")]
    Revoked,

    #[error("token blacklist unavailable: {0}")]
    Unavailable(String),

    #[error("token encoding failed: {0}")]
    Encoding(String),
}

impl From<TokenError> for DomainError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Unavailable(msg) => DomainError::service(msg),
            TokenError::Encoding(msg) => DomainError::internal(msg),
            _ => DomainError::authentication("Invalid or expired token"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlacklistError {
    #[error("blacklist store unavailable: {0}")]
    Unavailable(String),
}

impl From<BlacklistError> for TokenError {
    fn from(value: BlacklistError) -> Self {
        match value {
            BlacklistError::Unavailable(msg) => TokenError::Unavailable(msg),
        }
    }
}

/// Revoked token ids, kept until the token would have expired anyway.
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Insert-if-absent. `Ok(true)` when this call added the id.
    async fn insert(&self, jti: Uuid, expires_at: DateTime<Utc>) -> Result<bool, BlacklistError>;

    async fn contains(&self, jti: Uuid) -> Result<bool, BlacklistError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::hours(4),
            refresh: Duration::days(7),
        }
    }
}

/// Who a token pair is issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub is_super_admin: bool,
    pub is_staff: bool,
    pub login_id: String,
    pub email: String,
    pub name: String,
    pub permissions: Vec<Permission>,
}

impl TokenSubject {
    pub fn for_user(user: &User, permissions: Vec<Permission>) -> Self {
        Self {
            user_id: user.id,
            organization_id: user.organization_id,
            is_super_admin: user.is_super_admin,
            is_staff: user.is_staff,
            login_id: user.login_id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            permissions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetimes: TokenLifetimes,
    blacklist: Arc<dyn TokenBlacklist>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        secret: &[u8],
        lifetimes: TokenLifetimes,
        blacklist: Arc<dyn TokenBlacklist>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time checks go through `validate_claims` with our clock.
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            lifetimes,
            blacklist,
            clock,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    pub fn issue_pair(&self, subject: &TokenSubject) -> Result<TokenPair, TokenError> {
        let now = self.clock.now();
        let access_expires_at = now + self.lifetimes.access;
        let refresh_expires_at = now + self.lifetimes.refresh;

        let access = self.encode(subject, TokenKind::Access, now, access_expires_at)?;
        let refresh = self.encode(subject, TokenKind::Refresh, now, refresh_expires_at)?;

        Ok(TokenPair {
            access,
            refresh,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Signature, time window and kind. Does not consult the blacklist.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        validate_claims(&claims, self.clock.now())?;
        if claims.token_type != expected {
            return Err(TokenError::WrongKind {
                expected,
                found: claims.token_type,
            });
        }
        Ok(claims)
    }

    pub async fn is_revoked(&self, claims: &Claims) -> Result<bool, TokenError> {
        Ok(self.blacklist.contains(claims.jti).await?)
    }

    /// Consume a refresh token, returning its claims. The caller issues the
    /// replacement pair from the account as it stands now.
    pub async fn redeem(&self, refresh_token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify(refresh_token, TokenKind::Refresh)?;
        let expires_at = claims
            .expires_at()
            .ok_or_else(|| TokenError::Malformed("exp out of range".to_string()))?;

        if !self.blacklist.insert(claims.jti, expires_at).await? {
            tracing::warn!(user_id = %claims.user_id, jti = %claims.jti, "refresh token reuse rejected");
            return Err(TokenError::Revoked);
        }
        Ok(claims)
    }

    /// Blacklist a token of either kind. Expired tokens are accepted so a
    /// logout never fails just because the session already lapsed.
    pub async fn revoke(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        let expires_at = claims
            .expires_at()
            .ok_or_else(|| TokenError::Malformed("exp out of range".to_string()))?;
        self.blacklist.insert(claims.jti, expires_at).await?;
        Ok(claims)
    }

    fn encode(
        &self,
        subject: &TokenSubject,
        kind: TokenKind,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            user_id: subject.user_id,
            organization_id: subject.organization_id,
            is_super_admin: subject.is_super_admin,
            is_staff: subject.is_staff,
            login_id: subject.login_id.clone(),
            email: subject.email.clone(),
            name: subject.name.clone(),
            permissions: subject.permissions.clone(),
            token_type: kind,
            jti: Uuid::now_v7(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}
