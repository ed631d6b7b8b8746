//! In-memory implementations of the auth ports, for tests and dev.
//!
//! Each store keeps its whole state behind one lock so every check-then-write
//! operation is atomic with respect to concurrent callers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use netdesk_core::{Clock, DomainError, DomainResult, OrganizationId, RoleId, UserId};

use crate::directory::OrganizationDirectory;
use crate::roles::{
    capacity_reached, AssignOutcome, NewAssignment, Revocation, Role, RoleAssignment, RoleFilter,
    RoleStore,
};
use crate::tokens::{BlacklistError, TokenBlacklist};
use crate::user::{FailedLogin, StoredSession, User, UserFilter, UserProfileUpdate, UserStore};

fn read<T>(lock: &RwLock<T>) -> DomainResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| DomainError::internal("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> DomainResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| DomainError::internal("in-memory store lock poisoned"))
}

fn user_not_found() -> DomainError {
    DomainError::not_found("User not found")
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<R>(&self, id: UserId, f: impl FnOnce(&mut User) -> R) -> DomainResult<R> {
        let mut users = write(&self.inner)?;
        let user = users.get_mut(&id).ok_or_else(user_not_found)?;
        Ok(f(user))
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: User) -> DomainResult<User> {
        let mut users = write(&self.inner)?;
        let email = user.email.to_lowercase();
        for existing in users.values() {
            if existing.login_id == user.login_id {
                return Err(DomainError::conflict("A user with this login ID already exists"));
            }
            if existing.email.to_lowercase() == email {
                return Err(DomainError::conflict("A user with this email already exists"));
            }
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: UserId) -> DomainResult<Option<User>> {
        Ok(read(&self.inner)?.get(&id).cloned())
    }

    async fn find_by_login_id(&self, login_id: &str) -> DomainResult<Option<User>> {
        Ok(read(&self.inner)?
            .values()
            .find(|u| u.login_id == login_id)
            .cloned())
    }

    async fn list(&self, filter: &UserFilter) -> DomainResult<Vec<User>> {
        let mut out: Vec<User> = read(&self.inner)?
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &UserProfileUpdate,
        now: DateTime<Utc>,
    ) -> DomainResult<User> {
        self.mutate(id, |user| {
            update.apply(user, now);
            user.clone()
        })
    }

    async fn set_active(&self, id: UserId, active: bool, now: DateTime<Utc>) -> DomainResult<User> {
        self.mutate(id, |user| {
            user.is_active = active;
            user.updated_at = now;
            user.clone()
        })
    }

    async fn set_password_hash(&self, id: UserId, hash: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.mutate(id, |user| {
            user.password_hash = hash.to_string();
            user.updated_at = now;
        })
    }

    async fn record_failed_login(
        &self,
        id: UserId,
        threshold: u32,
        lock_until: DateTime<Utc>,
    ) -> DomainResult<FailedLogin> {
        self.mutate(id, |user| {
            user.failed_login_attempts = user.failed_login_attempts.saturating_add(1);
            if user.failed_login_attempts >= threshold {
                user.locked_until = Some(lock_until);
            }
            FailedLogin {
                attempts: user.failed_login_attempts,
                locked_until: user.locked_until,
            }
        })
    }

    async fn record_successful_login(&self, id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.mutate(id, |user| {
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.last_login = Some(now);
        })
    }

    async fn store_session(&self, id: UserId, session: StoredSession) -> DomainResult<()> {
        self.mutate(id, |user| user.session = Some(session))
    }

    async fn clear_session(&self, id: UserId) -> DomainResult<Option<StoredSession>> {
        self.mutate(id, |user| user.session.take())
    }

    async fn delete(&self, id: UserId) -> DomainResult<()> {
        write(&self.inner)?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(user_not_found)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RoleState {
    roles: HashMap<RoleId, Role>,
    assignments: Vec<RoleAssignment>,
}

impl RoleState {
    fn active_for(&self, role_id: RoleId) -> impl Iterator<Item = &RoleAssignment> {
        self.assignments
            .iter()
            .filter(move |a| a.role_id == role_id && a.is_active)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    inner: RwLock<RoleState>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn insert_role(&self, role: Role) -> DomainResult<Role> {
        let mut state = write(&self.inner)?;
        let taken = state
            .roles
            .values()
            .any(|r| r.name == role.name && r.organization_id == role.organization_id);
        if taken {
            return Err(DomainError::conflict(
                "Role with this name already exists in this organization",
            ));
        }
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn get_role(&self, id: RoleId) -> DomainResult<Option<Role>> {
        Ok(read(&self.inner)?.roles.get(&id).cloned())
    }

    async fn list_roles(&self, filter: &RoleFilter) -> DomainResult<Vec<Role>> {
        let mut out: Vec<Role> = read(&self.inner)?
            .roles
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.level
                .cmp(&b.level)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        Ok(out)
    }

    async fn update_role(&self, role: &Role) -> DomainResult<Role> {
        let mut state = write(&self.inner)?;
        let slot = state
            .roles
            .get_mut(&role.id)
            .ok_or_else(|| DomainError::not_found("Role not found"))?;
        *slot = role.clone();
        Ok(role.clone())
    }

    async fn delete_role(&self, id: RoleId) -> DomainResult<()> {
        let mut state = write(&self.inner)?;
        let role = state
            .roles
            .get(&id)
            .ok_or_else(|| DomainError::not_found("Role not found"))?;
        if role.is_system_role {
            return Err(DomainError::conflict("System roles cannot be deleted"));
        }
        if state.active_for(id).next().is_some() {
            return Err(DomainError::conflict(
                "Cannot delete role with active user assignments",
            ));
        }
        state.roles.remove(&id);
        Ok(())
    }

    async fn assign(
        &self,
        assignment: NewAssignment,
        max_assignments: Option<u32>,
    ) -> DomainResult<AssignOutcome> {
        let mut state = write(&self.inner)?;

        if let Some(existing) = state
            .active_for(assignment.role_id)
            .find(|a| a.user_id == assignment.user_id)
        {
            return Ok(AssignOutcome::AlreadyAssigned(existing.clone()));
        }

        if let Some(max) = max_assignments {
            let holders = state.active_for(assignment.role_id).count() as u64;
            if holders >= u64::from(max) {
                return Err(capacity_reached(max));
            }
        }

        let created = assignment.into_assignment();
        state.assignments.push(created.clone());
        Ok(AssignOutcome::Created(created))
    }

    async fn revoke(&self, revocation: Revocation) -> DomainResult<u64> {
        let mut state = write(&self.inner)?;
        let mut revoked = 0;
        for a in state.assignments.iter_mut().filter(|a| {
            a.is_active && a.user_id == revocation.user_id && a.role_id == revocation.role_id
        }) {
            a.is_active = false;
            a.revoked_at = Some(revocation.at);
            a.revoked_by = Some(revocation.revoked_by);
            a.revocation_reason = revocation.reason.clone();
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn active_assignments_for_role(&self, role_id: RoleId) -> DomainResult<Vec<RoleAssignment>> {
        Ok(read(&self.inner)?.active_for(role_id).cloned().collect())
    }

    async fn assignment_history(&self, user_id: UserId) -> DomainResult<Vec<RoleAssignment>> {
        let mut out: Vec<RoleAssignment> = read(&self.inner)?
            .assignments
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.assigned_at.cmp(&a.assigned_at));
        Ok(out)
    }

    async fn roles_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<Vec<Role>> {
        let state = read(&self.inner)?;
        let held: HashSet<RoleId> = state
            .assignments
            .iter()
            .filter(|a| a.user_id == user_id && a.is_effective(now))
            .map(|a| a.role_id)
            .collect();
        let mut out: Vec<Role> = held
            .into_iter()
            .filter_map(|id| state.roles.get(&id))
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        Ok(out)
    }

    async fn count_active_assignments(&self, role_id: RoleId) -> DomainResult<u64> {
        Ok(read(&self.inner)?.active_for(role_id).count() as u64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token blacklist
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local blacklist. Entries are dropped once the token has expired.
pub struct InMemoryTokenBlacklist {
    inner: Mutex<HashMap<Uuid, DateTime<Utc>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTokenBlacklist {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl TokenBlacklist for InMemoryTokenBlacklist {
    async fn insert(&self, jti: Uuid, expires_at: DateTime<Utc>) -> Result<bool, BlacklistError> {
        let now = self.clock.now();
        let mut map = self
            .inner
            .lock()
            .map_err(|_| BlacklistError::Unavailable("lock poisoned".to_string()))?;
        map.retain(|_, exp| *exp > now);
        if map.contains_key(&jti) {
            return Ok(false);
        }
        map.insert(jti, expires_at);
        Ok(true)
    }

    async fn contains(&self, jti: Uuid) -> Result<bool, BlacklistError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| BlacklistError::Unavailable("lock poisoned".to_string()))?;
        Ok(map.contains_key(&jti))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed set of known organizations.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    known: RwLock<HashSet<OrganizationId>>,
}

impl StaticDirectory {
    pub fn new(ids: impl IntoIterator<Item = OrganizationId>) -> Self {
        Self {
            known: RwLock::new(ids.into_iter().collect()),
        }
    }

    pub fn add(&self, id: OrganizationId) {
        if let Ok(mut known) = self.known.write() {
            known.insert(id);
        }
    }
}

#[async_trait]
impl OrganizationDirectory for StaticDirectory {
    async fn exists(&self, id: OrganizationId) -> bool {
        self.known.read().map(|k| k.contains(&id)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::OrgScope;
    use netdesk_core::ManualClock;

    fn user(login: &str, org: OrganizationId) -> User {
        User::new(login, format!("{login}@ktl.io"), login, org, "hash", Utc::now())
    }

    #[tokio::test]
    async fn duplicate_login_or_email_conflicts() {
        let store = InMemoryUserStore::new();
        let org = OrganizationId::new();
        store.insert(user("alice", org)).await.unwrap();

        let dup_login = store.insert(user("alice", org)).await.unwrap_err();
        assert!(matches!(dup_login, DomainError::Conflict(_)));

        let mut dup_mail = user("alice2", org);
        dup_mail.email = "ALICE@ktl.io".into();
        assert!(matches!(store.insert(dup_mail).await, Err(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn failed_logins_lock_at_threshold() {
        let store = InMemoryUserStore::new();
        let u = store.insert(user("bob", OrganizationId::new())).await.unwrap();
        let until = Utc::now() + chrono::Duration::minutes(30);

        for expected in 1..5 {
            let f = store.record_failed_login(u.id, 5, until).await.unwrap();
            assert_eq!(f.attempts, expected);
            assert_eq!(f.locked_until, None);
        }
        let f = store.record_failed_login(u.id, 5, until).await.unwrap();
        assert_eq!(f.attempts, 5);
        assert_eq!(f.locked_until, Some(until));

        store.record_successful_login(u.id, Utc::now()).await.unwrap();
        let reloaded = store.get(u.id).await.unwrap().unwrap();
        assert_eq!(reloaded.failed_login_attempts, 0);
        assert_eq!(reloaded.locked_until, None);
        assert!(reloaded.last_login.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_are_all_counted() {
        let store = Arc::new(InMemoryUserStore::new());
        let u = store.insert(user("carol", OrganizationId::new())).await.unwrap();
        let until = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_failed_login(u.id, 5, until).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let reloaded = store.get(u.id).await.unwrap().unwrap();
        assert_eq!(reloaded.failed_login_attempts, 20);
    }

    #[tokio::test]
    async fn list_is_scoped_and_newest_first() {
        let store = InMemoryUserStore::new();
        let mine = OrganizationId::new();
        let theirs = OrganizationId::new();
        let mut first = user("first", mine);
        first.created_at = Utc::now() - chrono::Duration::hours(1);
        store.insert(first).await.unwrap();
        store.insert(user("second", mine)).await.unwrap();
        store.insert(user("other", theirs)).await.unwrap();

        let listed = store.list(&UserFilter::scoped(OrgScope::Only(mine))).await.unwrap();
        let logins: Vec<_> = listed.iter().map(|u| u.login_id.as_str()).collect();
        assert_eq!(logins, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn blacklist_insert_is_first_writer_wins() {
        let clock = Arc::new(ManualClock::default());
        let bl = InMemoryTokenBlacklist::new(clock.clone());
        let jti = Uuid::now_v7();
        let exp = clock.now() + chrono::Duration::hours(1);

        assert!(bl.insert(jti, exp).await.unwrap());
        assert!(!bl.insert(jti, exp).await.unwrap());
        assert!(bl.contains(jti).await.unwrap());

        clock.advance(chrono::Duration::hours(2));
        bl.insert(Uuid::now_v7(), clock.now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(!bl.contains(jti).await.unwrap());
    }

    #[tokio::test]
    async fn static_directory_answers_membership() {
        let known = OrganizationId::new();
        let dir = StaticDirectory::new([known]);
        assert!(dir.exists(known).await);
        assert!(!dir.exists(OrganizationId::new()).await);
    }
}
