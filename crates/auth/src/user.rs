//! User accounts and the credential store port.
//!
//! A user belongs to exactly one organization. Lockout state lives on the
//! record itself and is only ever changed through the atomic
//! `record_failed_login` / `record_successful_login` operations so concurrent
//! login attempts cannot lose updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use netdesk_core::{DomainError, DomainResult, OrganizationId, UserId};

use crate::principal::OrgScope;

pub const MAX_LOGIN_ID_LENGTH: usize = 150;

/// UI language preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Bn,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Bn => "bn",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "en" => Ok(Language::En),
            "bn" => Ok(Language::Bn),
            other => Err(DomainError::validation(format!(
                "Unsupported language preference: {other}"
            ))),
        }
    }
}

/// Token pair persisted for remember-me sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remember_me: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub login_id: String,
    pub email: String,
    pub name: String,
    pub mobile: Option<String>,
    pub organization_id: OrganizationId,
    pub employee_id: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub language_preference: Language,
    pub timezone: String,

    pub password_hash: String,

    pub is_active: bool,
    pub is_staff: bool,
    pub is_super_admin: bool,
    pub is_email_verified: bool,
    pub is_phone_verified: bool,

    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub session: Option<StoredSession>,

    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fresh, active, non-privileged account.
    pub fn new(
        login_id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        organization_id: OrganizationId,
        password_hash: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UserId::new(),
            login_id: login_id.into(),
            email: email.into(),
            name: name.into(),
            mobile: None,
            organization_id,
            employee_id: None,
            address: None,
            postal_code: None,
            language_preference: Language::En,
            timezone: "Asia/Dhaka".to_string(),
            password_hash: password_hash.into(),
            is_active: true,
            is_staff: false,
            is_super_admin: false,
            is_email_verified: false,
            is_phone_verified: false,
            failed_login_attempts: 0,
            locked_until: None,
            session: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }
}

/// Login ids are `[A-Za-z0-9@_-]+`, at most 150 characters.
pub fn validate_login_id(login_id: &str) -> DomainResult<()> {
    if login_id.is_empty() {
        return Err(DomainError::validation("Login ID is required"));
    }
    if login_id.chars().count() > MAX_LOGIN_ID_LENGTH {
        return Err(DomainError::validation(format!(
            "Login ID must be at most {MAX_LOGIN_ID_LENGTH} characters"
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '@' | '_' | '-');
    if !login_id.chars().all(allowed) {
        return Err(DomainError::validation(
            "Login ID can only contain letters, numbers, @, _, and - characters.",
        ));
    }
    Ok(())
}

/// Structural email check: one `@`, non-empty local part, dotted domain.
pub fn validate_email(email: &str) -> DomainResult<()> {
    let invalid = || DomainError::validation("Enter a valid email address.");
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || email.chars().any(char::is_whitespace)
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(())
}

/// Fields an administrator (or the user) may change on a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserProfileUpdate {
    pub name: Option<String>,
    pub mobile: Option<String>,
    pub employee_id: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub language_preference: Option<Language>,
    pub timezone: Option<String>,
}

impl UserProfileUpdate {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("Name cannot be blank"));
            }
        }
        Ok(())
    }

    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) {
        if let Some(v) = &self.name {
            user.name = v.clone();
        }
        if let Some(v) = &self.mobile {
            user.mobile = Some(v.clone());
        }
        if let Some(v) = &self.employee_id {
            user.employee_id = Some(v.clone());
        }
        if let Some(v) = &self.address {
            user.address = Some(v.clone());
        }
        if let Some(v) = &self.postal_code {
            user.postal_code = Some(v.clone());
        }
        if let Some(v) = self.language_preference {
            user.language_preference = v;
        }
        if let Some(v) = &self.timezone {
            user.timezone = v.clone();
        }
        user.updated_at = now;
    }
}

/// Collection filter. `scope` is always applied; `organization_id` narrows
/// further and can never widen a tenant-scoped caller's view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFilter {
    pub scope: OrgScope,
    pub organization_id: Option<OrganizationId>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_super_admin: Option<bool>,
    pub search: Option<String>,
}

impl UserFilter {
    pub fn scoped(scope: OrgScope) -> Self {
        Self {
            scope,
            organization_id: None,
            is_active: None,
            is_staff: None,
            is_super_admin: None,
            search: None,
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        if !self.scope.admits(&user.organization_id) {
            return false;
        }
        if matches!(self.organization_id, Some(org) if org != user.organization_id) {
            return false;
        }
        if matches!(self.is_active, Some(v) if v != user.is_active) {
            return false;
        }
        if matches!(self.is_staff, Some(v) if v != user.is_staff) {
            return false;
        }
        if matches!(self.is_super_admin, Some(v) if v != user.is_super_admin) {
            return false;
        }
        if let Some(term) = self.search.as_deref().map(str::to_lowercase) {
            let hit = [&user.login_id, &user.email, &user.name]
                .iter()
                .any(|field| field.to_lowercase().contains(&term))
                || user
                    .employee_id
                    .as_deref()
                    .is_some_and(|e| e.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Counter state after a failed attempt was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLogin {
    pub attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Persistence port for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Conflict when the login id or email is already taken.
    async fn insert(&self, user: User) -> DomainResult<User>;

    async fn get(&self, id: UserId) -> DomainResult<Option<User>>;

    async fn find_by_login_id(&self, login_id: &str) -> DomainResult<Option<User>>;

    /// Newest first.
    async fn list(&self, filter: &UserFilter) -> DomainResult<Vec<User>>;

    async fn update_profile(
        &self,
        id: UserId,
        update: &UserProfileUpdate,
        now: DateTime<Utc>,
    ) -> DomainResult<User>;

    async fn set_active(&self, id: UserId, active: bool, now: DateTime<Utc>) -> DomainResult<User>;

    async fn set_password_hash(&self, id: UserId, hash: &str, now: DateTime<Utc>) -> DomainResult<()>;

    /// Atomically increment the failure counter; when the new count reaches
    /// `threshold`, set `locked_until`. Both fields are persisted together.
    async fn record_failed_login(
        &self,
        id: UserId,
        threshold: u32,
        lock_until: DateTime<Utc>,
    ) -> DomainResult<FailedLogin>;

    /// Reset the counter, clear the lock and stamp `last_login`.
    async fn record_successful_login(&self, id: UserId, now: DateTime<Utc>) -> DomainResult<()>;

    async fn store_session(&self, id: UserId, session: StoredSession) -> DomainResult<()>;

    /// Clear stored session fields, returning what was there.
    async fn clear_session(&self, id: UserId) -> DomainResult<Option<StoredSession>>;

    /// Remove the account outright. Only used to undo a creation that could
    /// not be completed; deactivation is the regular path.
    async fn delete(&self, id: UserId) -> DomainResult<()>;
}
