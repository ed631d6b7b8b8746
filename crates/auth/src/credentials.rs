//! Credential checks and account lockout.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use thiserror::Error;

use netdesk_core::{Clock, DomainError};

use crate::password::verify_password;
use crate::user::{User, UserStore};

/// Consecutive failures allowed before the account is locked, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub threshold: u32,
    pub lock_for: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            lock_for: Duration::minutes(30),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("User not found")]
    NotFound,

    #[error("Account is locked until {}", .until.to_rfc3339_opts(SecondsFormat::Secs, true))]
    Locked { until: DateTime<Utc> },

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Account is deactivated")]
    Deactivated,

    #[error(transparent)]
    Store(#[from] DomainError),
}

impl From<AuthFailure> for DomainError {
    fn from(value: AuthFailure) -> Self {
        match value {
            AuthFailure::NotFound | AuthFailure::InvalidPassword => {
                DomainError::authentication(value.to_string())
            }
            AuthFailure::Locked { .. } | AuthFailure::Deactivated => {
                DomainError::authorization(value.to_string())
            }
            AuthFailure::Store(err) => err,
        }
    }
}

pub struct CredentialStore {
    users: Arc<dyn UserStore>,
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
}

impl CredentialStore {
    pub fn new(users: Arc<dyn UserStore>, policy: LockoutPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            users,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    /// Check a login attempt.
    ///
    /// Order matters: unknown ids never touch a counter, a locked account is
    /// rejected before the password is looked at, and the active flag is only
    /// consulted once the password has been proven.
    pub async fn authenticate(&self, login_id: &str, password: &str) -> Result<User, AuthFailure> {
        let now = self.clock.now();

        let mut user = self
            .users
            .find_by_login_id(login_id)
            .await?
            .ok_or(AuthFailure::NotFound)?;

        if let Some(until) = user.locked_until.filter(|until| *until > now) {
            tracing::info!(user_id = %user.id, %until, "login rejected: account locked");
            return Err(AuthFailure::Locked { until });
        }

        let matches = verify_password(password, &user.password_hash)
            .await
            .map_err(|e| AuthFailure::Store(e.into()))?;

        if !matches {
            let outcome = self
                .users
                .record_failed_login(user.id, self.policy.threshold, now + self.policy.lock_for)
                .await?;
            if let Some(until) = outcome.locked_until {
                if outcome.attempts == self.policy.threshold {
                    tracing::info!(user_id = %user.id, %until, "account locked after repeated failures");
                }
            }
            return Err(AuthFailure::InvalidPassword);
        }

        if !user.is_active {
            return Err(AuthFailure::Deactivated);
        }

        self.users.record_successful_login(user.id, now).await?;
        user.failed_login_attempts = 0;
        user.locked_until = None;
        user.last_login = Some(now);
        Ok(user)
    }
}
