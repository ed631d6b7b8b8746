//! Login, refresh, logout and token verification.

use std::sync::Arc;

use chrono::Duration;
use serde::Deserialize;

use netdesk_core::{Clock, DomainError, DomainResult};

use crate::accounts::UserView;
use crate::credentials::CredentialStore;
use crate::engine::RoleEngine;
use crate::principal::Principal;
use crate::tokens::{TokenError, TokenPair, TokenService, TokenSubject};
use crate::user::{StoredSession, UserStore};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub login_id: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub logout_all_devices: bool,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserView,
    pub tokens: TokenPair,
    pub remember_me: bool,
}

pub struct AuthService {
    credentials: CredentialStore,
    tokens: Arc<TokenService>,
    engine: Arc<RoleEngine>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    remember_me_for: Duration,
}

impl AuthService {
    pub fn new(
        credentials: CredentialStore,
        tokens: Arc<TokenService>,
        engine: Arc<RoleEngine>,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
        remember_me_for: Duration,
    ) -> Self {
        Self {
            credentials,
            tokens,
            engine,
            users,
            clock,
            remember_me_for,
        }
    }

    pub async fn login(&self, request: LoginRequest) -> DomainResult<LoginOutcome> {
        if request.login_id.is_empty() || request.password.is_empty() {
            return Err(DomainError::validation("Login ID and password are required"));
        }

        let user = self
            .credentials
            .authenticate(&request.login_id, &request.password)
            .await?;

        let roles = self.engine.roles_for_user(user.id).await?;
        let permissions = self.engine.effective_permissions(user.id).await?;
        let tokens = self
            .tokens
            .issue_pair(&TokenSubject::for_user(&user, permissions.into_iter().collect()))?;

        if request.remember_me {
            let now = self.clock.now();
            self.users
                .store_session(
                    user.id,
                    StoredSession {
                        access_token: tokens.access.clone(),
                        refresh_token: tokens.refresh.clone(),
                        created_at: now,
                        expires_at: now + self.remember_me_for,
                        remember_me: true,
                    },
                )
                .await?;
        }

        tracing::info!(user_id = %user.id, remember_me = request.remember_me, "login succeeded");
        Ok(LoginOutcome {
            user: UserView::new(&user, &roles),
            tokens,
            remember_me: request.remember_me,
        })
    }

    /// Rotate a refresh token. The new pair is built from the stored account,
    /// so deactivation and role changes take effect at the next refresh.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> DomainResult<TokenPair> {
        let token = refresh_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DomainError::validation("Refresh token is required"))?;

        let claims = self.tokens.redeem(token).await.map_err(|err| match err {
            TokenError::Unavailable(_) | TokenError::Encoding(_) => err.into(),
            other => {
                tracing::warn!(error = %other, "refresh rejected");
                refresh_rejected()
            }
        })?;

        let Some(user) = self.users.get(claims.user_id).await?.filter(|u| u.is_active) else {
            tracing::warn!(user_id = %claims.user_id, "refresh rejected for inactive or missing user");
            return Err(refresh_rejected());
        };

        let permissions = self.engine.effective_permissions(user.id).await?;
        Ok(self
            .tokens
            .issue_pair(&TokenSubject::for_user(&user, permissions.into_iter().collect()))?)
    }

    /// Blacklist the caller's access token, the presented refresh token and,
    /// when asked (or a refresh token is presented), the stored remember-me
    /// session. Tokens that no longer decode are skipped.
    pub async fn logout(
        &self,
        principal: &Principal,
        access_token: &str,
        request: LogoutRequest,
    ) -> DomainResult<()> {
        self.revoke_quietly(access_token).await?;

        let presented = request
            .refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if let Some(token) = presented {
            self.revoke_quietly(token).await?;
        }

        if request.logout_all_devices || presented.is_some() {
            if let Some(session) = self.users.clear_session(principal.user_id).await? {
                self.revoke_quietly(&session.refresh_token).await?;
                self.revoke_quietly(&session.access_token).await?;
            }
        }

        tracing::info!(
            user_id = %principal.user_id,
            all_devices = request.logout_all_devices,
            "logout"
        );
        Ok(())
    }

    /// The user behind a verified access token.
    pub async fn verify(&self, principal: &Principal) -> DomainResult<UserView> {
        let user = self
            .users
            .get(principal.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| DomainError::authentication("Invalid or expired token"))?;
        let roles = self.engine.roles_for_user(user.id).await?;
        Ok(UserView::new(&user, &roles))
    }

    async fn revoke_quietly(&self, token: &str) -> DomainResult<()> {
        match self.tokens.revoke(token).await {
            Ok(_) => Ok(()),
            Err(err @ TokenError::Unavailable(_)) => Err(err.into()),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring undecodable token on logout");
                Ok(())
            }
        }
    }
}

fn refresh_rejected() -> DomainError {
    DomainError::authentication("Invalid or expired refresh token")
}
