use std::sync::Arc;

use netdesk_core::{DomainError, DomainResult, OrganizationId};

use crate::claims::TokenKind;
use crate::principal::{Identity, Principal};
use crate::tokens::{TokenError, TokenService};

/// Resolves a request's bearer token into an [`Identity`].
///
/// Single pass, no retries. Anything that is not a valid, unrevoked access
/// token resolves to `Anonymous`; only an unreachable blacklist is surfaced as
/// an error, and only when the guard is configured to fail closed.
pub struct AuthorizationGuard {
    tokens: Arc<TokenService>,
    fail_open: bool,
}

impl AuthorizationGuard {
    pub fn new(tokens: Arc<TokenService>, fail_open: bool) -> Self {
        Self { tokens, fail_open }
    }

    pub async fn resolve(&self, bearer: Option<&str>) -> DomainResult<Identity> {
        let Some(token) = bearer else {
            return Ok(Identity::Anonymous);
        };

        let claims = match self.tokens.verify(token, TokenKind::Access) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::warn!(error = %err, "bearer token rejected");
                return Ok(Identity::Anonymous);
            }
        };

        match self.tokens.is_revoked(&claims).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::warn!(user_id = %claims.user_id, jti = %claims.jti, "revoked access token presented");
                return Ok(Identity::Anonymous);
            }
            Err(TokenError::Unavailable(reason)) if self.fail_open => {
                tracing::warn!(%reason, "blacklist unavailable, admitting token (fail-open)");
            }
            Err(err) => {
                tracing::error!(error = %err, "blacklist lookup failed");
                return Err(err.into());
            }
        }

        Ok(Identity::Authenticated(Principal::from_claims(&claims)))
    }
}

/// Administrative writes: super admin or staff.
pub fn require_admin(principal: &Principal) -> DomainResult<()> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(DomainError::authorization(
            "Only administrators can perform this action",
        ))
    }
}

pub fn require_super_admin(principal: &Principal) -> DomainResult<()> {
    if principal.is_super_admin {
        Ok(())
    } else {
        Err(DomainError::authorization(
            "Only super administrators can perform this action",
        ))
    }
}

/// Object-level tenant check. Organization ids are compared as opaque strings.
pub fn ensure_same_organization(
    principal: &Principal,
    organization_id: &OrganizationId,
) -> DomainResult<()> {
    if principal.is_super_admin
        || principal.organization_id.to_string() == organization_id.to_string()
    {
        Ok(())
    } else {
        Err(DomainError::authorization("Access denied"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTokenBlacklist;
    use crate::permissions::roles;
    use crate::tokens::{BlacklistError, TokenBlacklist, TokenLifetimes, TokenSubject};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use netdesk_core::{Clock, ManualClock, UserId};
    use uuid::Uuid;

    struct DownBlacklist;

    #[async_trait]
    impl TokenBlacklist for DownBlacklist {
        async fn insert(&self, _: Uuid, _: DateTime<Utc>) -> Result<bool, BlacklistError> {
            Err(BlacklistError::Unavailable("connection refused".into()))
        }

        async fn contains(&self, _: Uuid) -> Result<bool, BlacklistError> {
            Err(BlacklistError::Unavailable("connection refused".into()))
        }
    }

    fn subject(org: OrganizationId) -> TokenSubject {
        TokenSubject {
            user_id: UserId::new(),
            organization_id: org,
            is_super_admin: false,
            is_staff: false,
            login_id: "noc".into(),
            email: "noc@ktl.io".into(),
            name: "NOC".into(),
            permissions: vec![roles::VIEW],
        }
    }

    fn tokens(blacklist: Arc<dyn TokenBlacklist>, clock: Arc<dyn Clock>) -> Arc<TokenService> {
        Arc::new(TokenService::new(
            b"guard-secret",
            TokenLifetimes::default(),
            blacklist,
            clock,
        ))
    }

    #[tokio::test]
    async fn missing_or_garbage_token_is_anonymous() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let svc = tokens(Arc::new(InMemoryTokenBlacklist::new(clock.clone())), clock);
        let guard = AuthorizationGuard::new(svc, false);

        assert_eq!(guard.resolve(None).await.unwrap(), Identity::Anonymous);
        assert_eq!(guard.resolve(Some("abc")).await.unwrap(), Identity::Anonymous);
    }

    #[tokio::test]
    async fn valid_access_token_builds_principal() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let svc = tokens(Arc::new(InMemoryTokenBlacklist::new(clock.clone())), clock);
        let guard = AuthorizationGuard::new(svc.clone(), false);
        let org = OrganizationId::new();
        let pair = svc.issue_pair(&subject(org)).unwrap();

        let identity = guard.resolve(Some(&pair.access)).await.unwrap();
        let principal = identity.principal().unwrap();
        assert_eq!(principal.organization_id, org);
        assert!(principal.permissions.contains(&roles::VIEW));

        // Refresh tokens are not bearer credentials.
        assert_eq!(
            guard.resolve(Some(&pair.refresh)).await.unwrap(),
            Identity::Anonymous
        );

        svc.revoke(&pair.access).await.unwrap();
        assert_eq!(
            guard.resolve(Some(&pair.access)).await.unwrap(),
            Identity::Anonymous
        );
    }

    #[tokio::test]
    async fn unreachable_blacklist_fails_closed_by_default() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let svc = tokens(Arc::new(DownBlacklist), clock);
        let pair = svc.issue_pair(&subject(OrganizationId::new())).unwrap();

        let closed = AuthorizationGuard::new(svc.clone(), false);
        assert!(matches!(
            closed.resolve(Some(&pair.access)).await,
            Err(DomainError::ServiceCommunication(_))
        ));

        let open = AuthorizationGuard::new(svc, true);
        assert!(open.resolve(Some(&pair.access)).await.unwrap().principal().is_some());
    }

    #[test]
    fn admin_and_tenant_checks() {
        let org = OrganizationId::new();
        let mut p = Principal::from_claims(&crate::claims::Claims {
            user_id: UserId::new(),
            organization_id: org,
            is_super_admin: false,
            is_staff: false,
            login_id: "x".into(),
            email: "x@ktl.io".into(),
            name: "X".into(),
            permissions: vec![],
            token_type: TokenKind::Access,
            jti: Uuid::now_v7(),
            iat: 0,
            exp: 1,
        });

        assert!(require_admin(&p).is_err());
        assert!(ensure_same_organization(&p, &org).is_ok());
        assert!(ensure_same_organization(&p, &OrganizationId::new()).is_err());

        p.is_staff = true;
        assert!(require_admin(&p).is_ok());
        assert!(require_super_admin(&p).is_err());

        p.is_super_admin = true;
        assert!(ensure_same_organization(&p, &OrganizationId::new()).is_ok());
    }
}
