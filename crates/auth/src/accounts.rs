//! User account management.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use netdesk_core::{Clock, DomainError, DomainResult, OrganizationId, RoleId, UserId};

use crate::authorize::{ensure_same_organization, require_admin};
use crate::directory::OrganizationDirectory;
use crate::engine::RoleEngine;
use crate::password::{hash_password, validate_password_strength, verify_password};
use crate::permissions::group_by_area;
use crate::principal::Principal;
use crate::roles::Role;
use crate::tokens::{TokenError, TokenService};
use crate::user::{
    validate_email, validate_login_id, Language, User, UserFilter, UserProfileUpdate, UserStore,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSummary {
    pub id: RoleId,
    pub name: String,
    pub display_name: String,
    pub level: u32,
}

impl From<&Role> for RoleSummary {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            name: role.name.clone(),
            display_name: role.display_name.clone(),
            level: role.level,
        }
    }
}

/// Outward representation of a user; never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
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
    pub is_active: bool,
    pub is_staff: bool,
    pub is_super_admin: bool,
    pub is_email_verified: bool,
    pub is_phone_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub roles: Vec<RoleSummary>,
}

impl UserView {
    pub fn new(user: &User, roles: &[Role]) -> Self {
        Self {
            id: user.id,
            login_id: user.login_id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            mobile: user.mobile.clone(),
            organization_id: user.organization_id,
            employee_id: user.employee_id.clone(),
            address: user.address.clone(),
            postal_code: user.postal_code.clone(),
            language_preference: user.language_preference,
            timezone: user.timezone.clone(),
            is_active: user.is_active,
            is_staff: user.is_staff,
            is_super_admin: user.is_super_admin,
            is_email_verified: user.is_email_verified,
            is_phone_verified: user.is_phone_verified,
            last_login: user.last_login,
            created_at: user.created_at,
            updated_at: user.updated_at,
            roles: roles.iter().map(RoleSummary::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub login_id: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub password_confirm: String,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePassword {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

/// What the current user may do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionsView {
    pub is_super_admin: bool,
    pub permissions: Vec<String>,
    pub grouped: BTreeMap<String, Vec<String>>,
    pub roles: Vec<RoleSummary>,
}

/// First super-admin of a fresh installation.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub login_id: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub organization_id: OrganizationId,
    pub assign_role: bool,
}

pub struct AccountService {
    users: Arc<dyn UserStore>,
    engine: Arc<RoleEngine>,
    tokens: Arc<TokenService>,
    directory: Arc<dyn OrganizationDirectory>,
    clock: Arc<dyn Clock>,
    bcrypt_cost: u32,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        engine: Arc<RoleEngine>,
        tokens: Arc<TokenService>,
        directory: Arc<dyn OrganizationDirectory>,
        clock: Arc<dyn Clock>,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users,
            engine,
            tokens,
            directory,
            clock,
            bcrypt_cost,
        }
    }

    /// Create a user and give them their initial roles.
    ///
    /// Roles are resolved and their assignment caps checked before anything
    /// is written. A grant that still fails removes the new account again, so
    /// a rejected request never leaves a user behind.
    pub async fn create_user(&self, actor: &Principal, new: NewUser) -> DomainResult<UserView> {
        require_admin(actor)?;
        ensure_same_organization(actor, &new.organization_id)?;

        validate_login_id(&new.login_id)?;
        validate_email(&new.email)?;
        if new.name.trim().is_empty() {
            return Err(DomainError::validation("Name is required"));
        }
        if new.password != new.password_confirm {
            return Err(DomainError::validation("Passwords do not match"));
        }
        validate_password_strength(&new.password)?;
        if new.role_ids.is_empty() {
            return Err(DomainError::validation(
                "User must have at least one role assigned",
            ));
        }

        if !self.directory.exists(new.organization_id).await {
            return Err(DomainError::validation("Organization does not exist"));
        }

        let roles = self
            .engine
            .assignable_roles(new.organization_id, &new.role_ids)
            .await?;
        if roles.is_empty() {
            return Err(DomainError::validation("No valid roles found for the given IDs"));
        }
        for role in &roles {
            self.engine.ensure_capacity(role).await?;
        }

        let hash = hash_password(&new.password, self.bcrypt_cost).await?;
        let mut user = User::new(
            new.login_id,
            new.email,
            new.name,
            new.organization_id,
            hash,
            self.clock.now(),
        );
        user.mobile = new.mobile;
        user.employee_id = new.employee_id;
        user.is_staff = new.is_staff;

        let user = self.users.insert(user).await?;
        for role in &roles {
            let granted = self
                .engine
                .grant(user.id, role, actor.user_id, "Initial role assignment during user creation")
                .await;
            if let Err(err) = granted {
                tracing::warn!(user_id = %user.id, role_id = %role.id, error = %err, "initial grant failed, removing user");
                self.engine.withdraw_all(user.id, actor.user_id).await?;
                self.users.delete(user.id).await?;
                return Err(err);
            }
        }

        tracing::info!(user_id = %user.id, login_id = %user.login_id, actor = %actor.user_id, "user created");
        Ok(UserView::new(&user, &roles))
    }

    pub async fn list_users(&self, actor: &Principal, mut filter: UserFilter) -> DomainResult<Vec<UserView>> {
        filter.scope = actor.scope();
        let users = self.users.list(&filter).await?;
        let mut out = Vec::with_capacity(users.len());
        for user in &users {
            let roles = self.engine.roles_for_user(user.id).await?;
            out.push(UserView::new(user, &roles));
        }
        Ok(out)
    }

    pub async fn get_user(&self, actor: &Principal, id: UserId) -> DomainResult<UserView> {
        let user = self.scoped_user(actor, id).await?;
        self.view(&user).await
    }

    pub async fn update_user(
        &self,
        actor: &Principal,
        id: UserId,
        update: UserProfileUpdate,
    ) -> DomainResult<UserView> {
        require_admin(actor)?;
        update.validate()?;
        let user = self.scoped_user(actor, id).await?;
        let user = self
            .users
            .update_profile(user.id, &update, self.clock.now())
            .await?;
        self.view(&user).await
    }

    /// Soft delete: the account is deactivated, never removed. Its stored
    /// session is cleared and both tokens of that session are blacklisted.
    pub async fn deactivate_user(&self, actor: &Principal, id: UserId) -> DomainResult<()> {
        require_admin(actor)?;
        let user = self.scoped_user(actor, id).await?;
        self.users.set_active(user.id, false, self.clock.now()).await?;
        if let Some(session) = self.users.clear_session(user.id).await? {
            for token in [&session.access_token, &session.refresh_token] {
                match self.tokens.revoke(token).await {
                    Ok(_) => {}
                    Err(err @ TokenError::Unavailable(_)) => return Err(err.into()),
                    Err(err) => tracing::warn!(user_id = %user.id, error = %err, "stored token did not decode"),
                }
            }
        }
        tracing::info!(user_id = %user.id, actor = %actor.user_id, "user deactivated");
        Ok(())
    }

    pub async fn profile(&self, actor: &Principal) -> DomainResult<UserView> {
        let user = self.current(actor).await?;
        self.view(&user).await
    }

    pub async fn permissions(&self, actor: &Principal) -> DomainResult<PermissionsView> {
        let roles = self.engine.roles_for_user(actor.user_id).await?;
        let codes = self.engine.effective_permissions(actor.user_id).await?;
        Ok(PermissionsView {
            is_super_admin: actor.is_super_admin,
            permissions: codes.iter().map(|p| p.as_str().to_string()).collect(),
            grouped: group_by_area(&codes),
            roles: roles.iter().map(RoleSummary::from).collect(),
        })
    }

    pub async fn change_password(&self, actor: &Principal, change: ChangePassword) -> DomainResult<()> {
        let user = self.current(actor).await?;

        if !verify_password(&change.old_password, &user.password_hash).await? {
            return Err(DomainError::validation("Old password is incorrect"));
        }
        if change.new_password != change.new_password_confirm {
            return Err(DomainError::validation("New passwords do not match"));
        }
        validate_password_strength(&change.new_password)?;

        let hash = hash_password(&change.new_password, self.bcrypt_cost).await?;
        self.users
            .set_password_hash(user.id, &hash, self.clock.now())
            .await?;
        tracing::info!(user_id = %user.id, "password changed");
        Ok(())
    }

    /// Create a super-admin without an acting principal.
    pub async fn bootstrap_super_admin(&self, request: Bootstrap) -> DomainResult<User> {
        validate_login_id(&request.login_id)?;
        validate_email(&request.email)?;
        validate_password_strength(&request.password)?;

        if !self.directory.exists(request.organization_id).await {
            return Err(DomainError::validation("Organization does not exist"));
        }

        let hash = hash_password(&request.password, self.bcrypt_cost).await?;
        let mut user = User::new(
            request.login_id,
            request.email,
            request.name,
            request.organization_id,
            hash,
            self.clock.now(),
        );
        user.is_super_admin = true;
        user.is_staff = true;
        user.is_email_verified = true;
        let user = self.users.insert(user).await?;

        if request.assign_role {
            let role = self
                .engine
                .ensure_super_admin_role(request.organization_id, Some(user.id))
                .await?;
            self.engine
                .grant(user.id, &role, user.id, "Super admin bootstrap")
                .await?;
        }

        tracing::info!(user_id = %user.id, login_id = %user.login_id, "super admin created");
        Ok(user)
    }

    async fn current(&self, actor: &Principal) -> DomainResult<User> {
        self.users
            .get(actor.user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("User not found"))
    }

    async fn scoped_user(&self, actor: &Principal, id: UserId) -> DomainResult<User> {
        self.users
            .get(id)
            .await?
            .filter(|u| actor.scope().admits(&u.organization_id))
            .ok_or_else(|| DomainError::not_found("User not found"))
    }

    async fn view(&self, user: &User) -> DomainResult<UserView> {
        let roles = self.engine.roles_for_user(user.id).await?;
        Ok(UserView::new(user, &roles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::claims::TokenKind;
    use crate::memory::{InMemoryRoleStore, InMemoryTokenBlacklist, InMemoryUserStore, StaticDirectory};
    use crate::permissions::users as user_perms;
    use crate::roles::{
        capacity_reached, AssignOutcome, NewAssignment, NewRole, Revocation, RoleAssignment,
        RoleFilter, RoleStore,
    };
    use crate::tokens::{TokenLifetimes, TokenSubject};
    use crate::user::StoredSession;
    use netdesk_core::ManualClock;

    const STRONG: &str = "Str0ng!Pass";

    struct Fixture {
        accounts: AccountService,
        roles: Arc<InMemoryRoleStore>,
        contended: Arc<ContendedRoles>,
        users: Arc<InMemoryUserStore>,
        engine: Arc<RoleEngine>,
        tokens: Arc<TokenService>,
        org: OrganizationId,
        other_org: OrganizationId,
    }

    /// Role store where another writer grabs the last slot of the listed
    /// roles between the capacity check and the grant.
    struct ContendedRoles {
        inner: Arc<InMemoryRoleStore>,
        taken: Mutex<HashSet<RoleId>>,
    }

    #[async_trait]
    impl RoleStore for ContendedRoles {
        async fn insert_role(&self, role: Role) -> DomainResult<Role> {
            self.inner.insert_role(role).await
        }

        async fn get_role(&self, id: RoleId) -> DomainResult<Option<Role>> {
            self.inner.get_role(id).await
        }

        async fn list_roles(&self, filter: &RoleFilter) -> DomainResult<Vec<Role>> {
            self.inner.list_roles(filter).await
        }

        async fn update_role(&self, role: &Role) -> DomainResult<Role> {
            self.inner.update_role(role).await
        }

        async fn delete_role(&self, id: RoleId) -> DomainResult<()> {
            self.inner.delete_role(id).await
        }

        async fn assign(
            &self,
            assignment: NewAssignment,
            max_assignments: Option<u32>,
        ) -> DomainResult<AssignOutcome> {
            if self.taken.lock().unwrap().contains(&assignment.role_id) {
                return Err(capacity_reached(max_assignments.unwrap_or(0)));
            }
            self.inner.assign(assignment, max_assignments).await
        }

        async fn revoke(&self, revocation: Revocation) -> DomainResult<u64> {
            self.inner.revoke(revocation).await
        }

        async fn active_assignments_for_role(&self, role_id: RoleId) -> DomainResult<Vec<RoleAssignment>> {
            self.inner.active_assignments_for_role(role_id).await
        }

        async fn assignment_history(&self, user_id: UserId) -> DomainResult<Vec<RoleAssignment>> {
            self.inner.assignment_history(user_id).await
        }

        async fn roles_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<Vec<Role>> {
            self.inner.roles_for_user(user_id, now).await
        }

        async fn count_active_assignments(&self, role_id: RoleId) -> DomainResult<u64> {
            self.inner.count_active_assignments(role_id).await
        }
    }

    fn fixture() -> Fixture {
        let org = OrganizationId::new();
        let other_org = OrganizationId::new();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let users = Arc::new(InMemoryUserStore::new());
        let roles = Arc::new(InMemoryRoleStore::new());
        let contended = Arc::new(ContendedRoles {
            inner: roles.clone(),
            taken: Mutex::new(HashSet::new()),
        });
        let directory = Arc::new(StaticDirectory::new([org, other_org]));
        let engine = Arc::new(RoleEngine::new(
            contended.clone(),
            users.clone(),
            directory.clone(),
            clock.clone(),
        ));
        let tokens = Arc::new(TokenService::new(
            b"accounts-secret",
            TokenLifetimes::default(),
            Arc::new(InMemoryTokenBlacklist::new(clock.clone())),
            clock.clone(),
        ));
        let accounts = AccountService::new(
            users.clone(),
            engine.clone(),
            tokens.clone(),
            directory,
            clock,
            4,
        );
        Fixture {
            accounts,
            roles,
            contended,
            users,
            engine,
            tokens,
            org,
            other_org,
        }
    }

    fn staff(org: OrganizationId) -> Principal {
        Principal {
            user_id: UserId::new(),
            organization_id: org,
            is_super_admin: false,
            is_staff: true,
            login_id: "staff".into(),
            permissions: BTreeSet::new(),
        }
    }

    async fn role_in(f: &Fixture, org: OrganizationId) -> Role {
        capped_role_in(f, org, None).await
    }

    async fn capped_role_in(f: &Fixture, org: OrganizationId, max: Option<u32>) -> Role {
        let new = NewRole {
            name: format!("agent-{}", RoleId::new()),
            display_name: "Agent".into(),
            description: String::new(),
            organization_id: org,
            level: 10,
            is_system_role: false,
            can_assign_roles: false,
            max_assignments: max,
            permissions: vec![user_perms::VIEW],
        };
        let role = new.into_role([user_perms::VIEW].into_iter().collect(), None, Utc::now());
        f.roles.insert_role(role).await.unwrap()
    }

    fn new_user(login: &str, org: OrganizationId, roles: Vec<RoleId>) -> NewUser {
        NewUser {
            login_id: login.into(),
            email: format!("{login}@ktl.io"),
            name: "Test User".into(),
            password: STRONG.into(),
            password_confirm: STRONG.into(),
            organization_id: org,
            mobile: None,
            employee_id: None,
            is_staff: false,
            role_ids: roles,
        }
    }

    #[tokio::test]
    async fn create_assigns_initial_roles() {
        let f = fixture();
        let role = role_in(&f, f.org).await;
        let actor = staff(f.org);

        let view = f
            .accounts
            .create_user(&actor, new_user("agent1", f.org, vec![role.id]))
            .await
            .unwrap();
        assert_eq!(view.roles.len(), 1);

        let history = f.roles.assignment_history(view.id).await.unwrap();
        assert_eq!(
            history[0].assignment_reason,
            "Initial role assignment during user creation"
        );
        assert_eq!(history[0].assigned_by, actor.user_id);

        let perms = f.engine.effective_permissions(view.id).await.unwrap();
        assert!(perms.contains(&user_perms::VIEW));
    }

    #[tokio::test]
    async fn foreign_roles_leave_no_user_behind() {
        let f = fixture();
        let foreign = role_in(&f, f.other_org).await;
        let actor = staff(f.org);

        let err = f
            .accounts
            .create_user(&actor, new_user("ghost", f.org, vec![foreign.id]))
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::validation("No valid roles found for the given IDs"));
        assert!(f.users.find_by_login_id("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_role_rejects_creation_and_keeps_no_user() {
        let f = fixture();
        let capped = capped_role_in(&f, f.org, Some(1)).await;
        let open = role_in(&f, f.org).await;
        let actor = staff(f.org);

        f.accounts
            .create_user(&actor, new_user("first", f.org, vec![capped.id]))
            .await
            .unwrap();

        let err = f
            .accounts
            .create_user(&actor, new_user("second", f.org, vec![open.id, capped.id]))
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::conflict("Role has reached its maximum of 1 assignments"));
        assert!(f.users.find_by_login_id("second").await.unwrap().is_none());
        assert_eq!(f.roles.count_active_assignments(open.id).await.unwrap(), 0);
        assert_eq!(f.roles.count_active_assignments(capped.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn grant_lost_after_insert_removes_the_new_user() {
        let f = fixture();
        let open = role_in(&f, f.org).await;
        let capped = capped_role_in(&f, f.org, Some(1)).await;
        f.contended.taken.lock().unwrap().insert(capped.id);
        let actor = staff(f.org);

        let err = f
            .accounts
            .create_user(&actor, new_user("late", f.org, vec![open.id, capped.id]))
            .await
            .unwrap_err();
        assert_eq!(err, capacity_reached(1));
        assert!(f.users.find_by_login_id("late").await.unwrap().is_none());
        assert_eq!(f.roles.count_active_assignments(open.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deactivation_revokes_the_remembered_session() {
        let f = fixture();
        let role = role_in(&f, f.org).await;
        let actor = staff(f.org);
        let view = f
            .accounts
            .create_user(&actor, new_user("leaver", f.org, vec![role.id]))
            .await
            .unwrap();
        let user = f.users.get(view.id).await.unwrap().unwrap();
        let pair = f.tokens.issue_pair(&TokenSubject::for_user(&user, vec![])).unwrap();
        f.users
            .store_session(
                user.id,
                StoredSession {
                    access_token: pair.access.clone(),
                    refresh_token: pair.refresh.clone(),
                    created_at: Utc::now(),
                    expires_at: Utc::now() + chrono::Duration::days(30),
                    remember_me: true,
                },
            )
            .await
            .unwrap();

        f.accounts.deactivate_user(&actor, user.id).await.unwrap();

        let stored = f.users.get(user.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(stored.session.is_none());
        for (token, kind) in [(&pair.access, TokenKind::Access), (&pair.refresh, TokenKind::Refresh)] {
            let claims = f.tokens.verify(token, kind).unwrap();
            assert!(f.tokens.is_revoked(&claims).await.unwrap());
        }
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let f = fixture();
        let role = role_in(&f, f.org).await;
        let actor = staff(f.org);

        let mut mismatch = new_user("a1", f.org, vec![role.id]);
        mismatch.password_confirm = "Other!Pass1".into();
        assert_eq!(
            f.accounts.create_user(&actor, mismatch).await.unwrap_err(),
            DomainError::validation("Passwords do not match")
        );

        assert_eq!(
            f.accounts
                .create_user(&actor, new_user("a2", f.org, vec![]))
                .await
                .unwrap_err(),
            DomainError::validation("User must have at least one role assigned")
        );

        let mut weak = new_user("a3", f.org, vec![role.id]);
        weak.password = "short".into();
        weak.password_confirm = "short".into();
        assert!(matches!(
            f.accounts.create_user(&actor, weak).await,
            Err(DomainError::Validation(_))
        ));

        assert!(matches!(
            f.accounts
                .create_user(&actor, new_user("a4", f.other_org, vec![role.id]))
                .await,
            Err(DomainError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn foreign_users_are_invisible_to_tenant_staff() {
        let f = fixture();
        let root = Principal {
            is_super_admin: true,
            ..staff(f.org)
        };
        let role = role_in(&f, f.other_org).await;
        let foreign = f
            .accounts
            .create_user(&root, new_user("foreign", f.other_org, vec![role.id]))
            .await
            .unwrap();

        let actor = staff(f.org);
        assert_eq!(
            f.accounts.get_user(&actor, foreign.id).await.unwrap_err(),
            DomainError::not_found("User not found")
        );

        let mut filter = UserFilter::scoped(crate::principal::OrgScope::All);
        filter.organization_id = Some(f.other_org);
        assert!(f.accounts.list_users(&actor, filter.clone()).await.unwrap().is_empty());
        assert_eq!(f.accounts.list_users(&root, filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn change_password_checks_old_and_confirmation() {
        let f = fixture();
        let user = f
            .accounts
            .bootstrap_super_admin(Bootstrap {
                login_id: "root".into(),
                email: "root@ktl.io".into(),
                name: "Root".into(),
                password: STRONG.into(),
                organization_id: f.org,
                assign_role: false,
            })
            .await
            .unwrap();
        let me = Principal {
            user_id: user.id,
            ..staff(f.org)
        };

        let wrong_old = ChangePassword {
            old_password: "nope".into(),
            new_password: "N3w!Password".into(),
            new_password_confirm: "N3w!Password".into(),
        };
        assert_eq!(
            f.accounts.change_password(&me, wrong_old).await.unwrap_err(),
            DomainError::validation("Old password is incorrect")
        );

        let mismatch = ChangePassword {
            old_password: STRONG.into(),
            new_password: "N3w!Password".into(),
            new_password_confirm: "N3w!Passw0rd".into(),
        };
        assert_eq!(
            f.accounts.change_password(&me, mismatch).await.unwrap_err(),
            DomainError::validation("New passwords do not match")
        );

        let ok = ChangePassword {
            old_password: STRONG.into(),
            new_password: "N3w!Password".into(),
            new_password_confirm: "N3w!Password".into(),
        };
        f.accounts.change_password(&me, ok).await.unwrap();
        let stored = f.users.get(user.id).await.unwrap().unwrap();
        assert!(verify_password("N3w!Password", &stored.password_hash).await.unwrap());
    }

    #[tokio::test]
    async fn bootstrap_creates_and_assigns_super_admin_role() {
        let f = fixture();
        let user = f
            .accounts
            .bootstrap_super_admin(Bootstrap {
                login_id: "ktl_root".into(),
                email: "root@ktl.io".into(),
                name: "Root".into(),
                password: STRONG.into(),
                organization_id: f.org,
                assign_role: true,
            })
            .await
            .unwrap();
        assert!(user.is_super_admin);

        let roles = f.engine.roles_for_user(user.id).await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, crate::roles::SUPER_ADMIN_ROLE);
        assert!(roles[0].is_system_role);

        let dup = f
            .accounts
            .bootstrap_super_admin(Bootstrap {
                login_id: "ktl_root".into(),
                email: "other@ktl.io".into(),
                name: "Root".into(),
                password: STRONG.into(),
                organization_id: f.org,
                assign_role: true,
            })
            .await;
        assert!(matches!(dup, Err(DomainError::Conflict(_))));
    }
}
