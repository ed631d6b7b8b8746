//! Role/permission engine.
//!
//! Owns every rule about who may hold which role. Tenancy is enforced here as
//! well as in the guard: a user and a role must share an organization, and a
//! tenant-scoped administrator never sees or touches another tenant's roles.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use netdesk_core::{Clock, DomainError, DomainResult, OrganizationId, RoleId, UserId};

use crate::authorize::{ensure_same_organization, require_admin};
use crate::directory::OrganizationDirectory;
use crate::permissions::{validate_permissions, WILDCARD};
use crate::principal::Principal;
use crate::roles::{
    capacity_reached, AssignOutcome, NewAssignment, NewRole, Revocation, Role, RoleAssignment,
    RoleFilter, RoleStore, RoleUpdate, SUPER_ADMIN_ROLE,
};
use crate::user::UserStore;
use crate::Permission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssignAction {
    #[default]
    Assign,
    Revoke,
}

impl AssignAction {
    pub fn past_tense(&self) -> &'static str {
        match self {
            AssignAction::Assign => "assigned",
            AssignAction::Revoke => "revoked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssignRequest {
    pub user_id: UserId,
    pub role_id: RoleId,
    #[serde(default)]
    pub action: AssignAction,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of an assign/revoke request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleChange {
    pub action: &'static str,
    pub user: String,
    pub role: String,
    /// `false` when the request was a no-op (already assigned, nothing to revoke).
    #[serde(skip)]
    pub changed: bool,
}

/// A current holder of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleHolder {
    pub user_id: UserId,
    pub login_id: String,
    pub name: String,
    pub email: String,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: UserId,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct RoleEngine {
    roles: Arc<dyn RoleStore>,
    users: Arc<dyn UserStore>,
    directory: Arc<dyn OrganizationDirectory>,
    clock: Arc<dyn Clock>,
}

impl RoleEngine {
    pub fn new(
        roles: Arc<dyn RoleStore>,
        users: Arc<dyn UserStore>,
        directory: Arc<dyn OrganizationDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            roles,
            users,
            directory,
            clock,
        }
    }

    pub async fn create_role(&self, actor: &Principal, new: NewRole) -> DomainResult<Role> {
        require_admin(actor)?;
        ensure_same_organization(actor, &new.organization_id)?;
        if new.is_system_role && !actor.is_super_admin {
            return Err(DomainError::authorization(
                "Only super administrators can create system roles",
            ));
        }
        self.insert_role(new, Some(actor.user_id)).await
    }

    async fn insert_role(&self, new: NewRole, created_by: Option<UserId>) -> DomainResult<Role> {
        new.validate()?;
        let permissions = validate_permissions(&new.permissions)?;

        if !self.directory.exists(new.organization_id).await {
            return Err(DomainError::validation("Organization does not exist"));
        }

        let role = self
            .roles
            .insert_role(new.into_role(permissions, created_by, self.clock.now()))
            .await?;
        tracing::info!(role_id = %role.id, name = %role.name, organization_id = %role.organization_id, "role created");
        Ok(role)
    }

    /// Roles visible to the caller; the scope is never widened by `filter`.
    pub async fn list_roles(&self, actor: &Principal, mut filter: RoleFilter) -> DomainResult<Vec<Role>> {
        filter.scope = actor.scope();
        self.roles.list_roles(&filter).await
    }

    /// Out-of-scope roles are reported as missing.
    pub async fn get_role(&self, actor: &Principal, id: RoleId) -> DomainResult<Role> {
        self.roles
            .get_role(id)
            .await?
            .filter(|role| actor.scope().admits(&role.organization_id))
            .ok_or_else(|| DomainError::not_found("Role not found"))
    }

    pub async fn update_role(
        &self,
        actor: &Principal,
        id: RoleId,
        update: RoleUpdate,
    ) -> DomainResult<Role> {
        require_admin(actor)?;
        let mut role = self.get_role(actor, id).await?;

        if let Some(display_name) = update.display_name {
            if display_name.trim().is_empty() {
                return Err(DomainError::validation("Display name is required"));
            }
            role.display_name = display_name;
        }
        if let Some(description) = update.description {
            role.description = description;
        }
        if let Some(level) = update.level {
            if level == 0 {
                return Err(DomainError::validation("Role level must be at least 1"));
            }
            role.level = level;
        }
        if let Some(active) = update.is_active {
            role.is_active = active;
        }
        if let Some(can_assign) = update.can_assign_roles {
            role.can_assign_roles = can_assign;
        }
        if let Some(max) = update.max_assignments {
            role.max_assignments = Some(max);
        }
        if let Some(perms) = update.permissions {
            role.permissions = validate_permissions(&perms)?;
        }
        role.updated_at = self.clock.now();

        self.roles.update_role(&role).await
    }

    pub async fn delete_role(&self, actor: &Principal, id: RoleId) -> DomainResult<()> {
        require_admin(actor)?;
        let role = self
            .roles
            .get_role(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Role not found"))?;
        ensure_same_organization(actor, &role.organization_id)?;

        self.roles.delete_role(id).await?;
        tracing::info!(role_id = %id, name = %role.name, "role deleted");
        Ok(())
    }

    /// Assign or revoke a role.
    pub async fn change_assignment(
        &self,
        actor: &Principal,
        request: AssignRequest,
    ) -> DomainResult<RoleChange> {
        require_admin(actor)?;

        let user = self
            .users
            .get(request.user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("User not found"))?;

        let role = self
            .roles
            .get_role(request.role_id)
            .await?
            .filter(|r| r.is_active)
            .ok_or_else(|| DomainError::not_found("Role not found or inactive"))?;

        if user.organization_id != role.organization_id {
            return Err(DomainError::validation(
                "User and role must belong to the same organization",
            ));
        }
        ensure_same_organization(actor, &role.organization_id)?;

        let now = self.clock.now();
        let changed = match request.action {
            AssignAction::Assign => {
                let outcome = self
                    .roles
                    .assign(
                        NewAssignment {
                            user_id: user.id,
                            role_id: role.id,
                            assigned_by: actor.user_id,
                            reason: request.reason.unwrap_or_default(),
                            expires_at: request.expires_at,
                            at: now,
                        },
                        role.max_assignments,
                    )
                    .await?;
                matches!(outcome, AssignOutcome::Created(_))
            }
            AssignAction::Revoke => {
                let revoked = self
                    .roles
                    .revoke(Revocation {
                        user_id: user.id,
                        role_id: role.id,
                        revoked_by: actor.user_id,
                        reason: request.reason.unwrap_or_default(),
                        at: now,
                    })
                    .await?;
                revoked > 0
            }
        };

        if changed {
            tracing::info!(
                user_id = %user.id,
                role_id = %role.id,
                actor = %actor.user_id,
                action = request.action.past_tense(),
                "role assignment changed"
            );
        }

        Ok(RoleChange {
            action: request.action.past_tense(),
            user: user.login_id,
            role: role.name,
            changed,
        })
    }

    /// Current holders of a role. Callers outside the role's organization get
    /// Forbidden rather than an empty list.
    pub async fn list_users_for_role(
        &self,
        actor: &Principal,
        role_id: RoleId,
    ) -> DomainResult<Vec<RoleHolder>> {
        let role = self
            .roles
            .get_role(role_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Role not found"))?;
        ensure_same_organization(actor, &role.organization_id)?;

        let mut holders = Vec::new();
        for a in self.roles.active_assignments_for_role(role_id).await? {
            if let Some(user) = self.users.get(a.user_id).await? {
                holders.push(RoleHolder {
                    user_id: user.id,
                    login_id: user.login_id,
                    name: user.name,
                    email: user.email,
                    assigned_at: a.assigned_at,
                    assigned_by: a.assigned_by,
                    expires_at: a.expires_at,
                });
            }
        }
        Ok(holders)
    }

    pub async fn user_count(&self, actor: &Principal, role_id: RoleId) -> DomainResult<u64> {
        let role = self.get_role(actor, role_id).await?;
        self.roles.count_active_assignments(role.id).await
    }

    pub async fn assignment_history(
        &self,
        actor: &Principal,
        user_id: UserId,
    ) -> DomainResult<Vec<RoleAssignment>> {
        let user = self
            .users
            .get(user_id)
            .await?
            .filter(|u| actor.scope().admits(&u.organization_id))
            .ok_or_else(|| DomainError::not_found("User not found"))?;
        self.roles.assignment_history(user.id).await
    }

    /// Roles the user currently holds.
    pub async fn roles_for_user(&self, user_id: UserId) -> DomainResult<Vec<Role>> {
        self.roles.roles_for_user(user_id, self.clock.now()).await
    }

    /// Union of the permissions of every role the user currently holds.
    pub async fn effective_permissions(&self, user_id: UserId) -> DomainResult<BTreeSet<Permission>> {
        Ok(self
            .roles_for_user(user_id)
            .await?
            .into_iter()
            .flat_map(|role| role.permissions)
            .collect())
    }

    /// Active roles of `organization_id` among `ids`, for initial assignment
    /// on user creation. Unknown, inactive or foreign ids are skipped.
    pub async fn assignable_roles(
        &self,
        organization_id: OrganizationId,
        ids: &[RoleId],
    ) -> DomainResult<Vec<Role>> {
        let mut out: Vec<Role> = Vec::new();
        for id in ids {
            if let Some(role) = self.roles.get_role(*id).await? {
                if role.is_active
                    && role.organization_id == organization_id
                    && !out.iter().any(|r| r.id == role.id)
                {
                    out.push(role);
                }
            }
        }
        Ok(out)
    }

    /// Record an assignment without the administrative checks. Used when the
    /// caller has already been authorized (user creation, bootstrap).
    pub(crate) async fn grant(
        &self,
        user_id: UserId,
        role: &Role,
        assigned_by: UserId,
        reason: &str,
    ) -> DomainResult<AssignOutcome> {
        self.roles
            .assign(
                NewAssignment {
                    user_id,
                    role_id: role.id,
                    assigned_by,
                    reason: reason.to_string(),
                    expires_at: None,
                    at: self.clock.now(),
                },
                role.max_assignments,
            )
            .await
    }

    /// Conflict when a capped role has no free slot left. The store checks
    /// again under its lock; this only lets callers fail before writing.
    pub(crate) async fn ensure_capacity(&self, role: &Role) -> DomainResult<()> {
        if let Some(max) = role.max_assignments {
            if self.roles.count_active_assignments(role.id).await? >= u64::from(max) {
                return Err(capacity_reached(max));
            }
        }
        Ok(())
    }

    /// Revoke every role the user holds. Undoes a partial initial grant.
    pub(crate) async fn withdraw_all(&self, user_id: UserId, by: UserId) -> DomainResult<()> {
        let now = self.clock.now();
        for role in self.roles.roles_for_user(user_id, now).await? {
            self.roles
                .revoke(Revocation {
                    user_id,
                    role_id: role.id,
                    revoked_by: by,
                    reason: "User creation rolled back".to_string(),
                    at: now,
                })
                .await?;
        }
        Ok(())
    }

    /// The organization's `super_admin` system role, created on first use.
    pub async fn ensure_super_admin_role(
        &self,
        organization_id: OrganizationId,
        created_by: Option<UserId>,
    ) -> DomainResult<Role> {
        let mut filter = RoleFilter::scoped(crate::principal::OrgScope::Only(organization_id));
        filter.search = Some(SUPER_ADMIN_ROLE.to_string());
        if let Some(existing) = self
            .roles
            .list_roles(&filter)
            .await?
            .into_iter()
            .find(|r| r.name == SUPER_ADMIN_ROLE)
        {
            return Ok(existing);
        }

        self.insert_role(
            NewRole {
                name: SUPER_ADMIN_ROLE.to_string(),
                display_name: "Super Administrator".to_string(),
                description: "System-wide administrator with full access".to_string(),
                organization_id,
                level: 1,
                is_system_role: true,
                can_assign_roles: true,
                max_assignments: None,
                permissions: vec![WILDCARD],
            },
            created_by,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryRoleStore, InMemoryUserStore, StaticDirectory};
    use crate::permissions::{roles as role_perms, users as user_perms};
    use crate::user::User;
    use netdesk_core::ManualClock;

    struct Fixture {
        engine: Arc<RoleEngine>,
        users: Arc<InMemoryUserStore>,
        org_x: OrganizationId,
        org_y: OrganizationId,
    }

    fn fixture() -> Fixture {
        let org_x = OrganizationId::new();
        let org_y = OrganizationId::new();
        let users = Arc::new(InMemoryUserStore::new());
        let engine = Arc::new(RoleEngine::new(
            Arc::new(InMemoryRoleStore::new()),
            users.clone(),
            Arc::new(StaticDirectory::new([org_x, org_y])),
            Arc::new(ManualClock::default()),
        ));
        Fixture {
            engine,
            users,
            org_x,
            org_y,
        }
    }

    fn admin(org: OrganizationId, super_admin: bool) -> Principal {
        Principal {
            user_id: UserId::new(),
            organization_id: org,
            is_super_admin: super_admin,
            is_staff: true,
            login_id: "admin".into(),
            permissions: BTreeSet::new(),
        }
    }

    fn new_role(name: &str, org: OrganizationId) -> NewRole {
        NewRole {
            name: name.into(),
            display_name: name.to_uppercase(),
            description: String::new(),
            organization_id: org,
            level: 10,
            is_system_role: false,
            can_assign_roles: false,
            max_assignments: None,
            permissions: vec![user_perms::VIEW, role_perms::VIEW],
        }
    }

    async fn user_in(f: &Fixture, login: &str, org: OrganizationId) -> User {
        f.users
            .insert(User::new(login, format!("{login}@ktl.io"), login, org, "h", Utc::now()))
            .await
            .unwrap()
    }

    fn assign(user: &User, role: &Role) -> AssignRequest {
        AssignRequest {
            user_id: user.id,
            role_id: role.id,
            action: AssignAction::Assign,
            reason: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn create_requires_existing_organization() {
        let f = fixture();
        let root = admin(f.org_x, true);
        let err = f
            .engine
            .create_role(&root, new_role("noc", OrganizationId::new()))
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::validation("Organization does not exist"));
    }

    #[tokio::test]
    async fn duplicate_name_in_same_org_conflicts() {
        let f = fixture();
        let root = admin(f.org_x, true);
        f.engine.create_role(&root, new_role("noc", f.org_x)).await.unwrap();
        assert!(matches!(
            f.engine.create_role(&root, new_role("noc", f.org_x)).await,
            Err(DomainError::Conflict(_))
        ));
        // Same name elsewhere is fine.
        f.engine.create_role(&root, new_role("noc", f.org_y)).await.unwrap();
    }

    #[tokio::test]
    async fn tenant_admin_cannot_create_in_foreign_org() {
        let f = fixture();
        let staff = admin(f.org_x, false);
        assert!(matches!(
            f.engine.create_role(&staff, new_role("noc", f.org_y)).await,
            Err(DomainError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn cross_tenant_assignment_is_validation_error() {
        let f = fixture();
        let root = admin(f.org_x, true);
        let role = f.engine.create_role(&root, new_role("billing", f.org_x)).await.unwrap();
        let outsider = user_in(&f, "outsider", f.org_y).await;

        let err = f
            .engine
            .change_assignment(&root, assign(&outsider, &role))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("User and role must belong to the same organization")
        );
    }

    #[tokio::test]
    async fn reassigning_is_a_reported_noop() {
        let f = fixture();
        let root = admin(f.org_x, true);
        let role = f.engine.create_role(&root, new_role("billing", f.org_x)).await.unwrap();
        let user = user_in(&f, "rahim", f.org_x).await;

        let first = f.engine.change_assignment(&root, assign(&user, &role)).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.action, "assigned");
        assert_eq!(first.user, "rahim");
        assert_eq!(first.role, "billing");

        let second = f.engine.change_assignment(&root, assign(&user, &role)).await.unwrap();
        assert!(!second.changed);
        assert_eq!(f.engine.user_count(&root, role.id).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_assign_yields_one_active_assignment() {
        let f = fixture();
        let root = admin(f.org_x, true);
        let role = f.engine.create_role(&root, new_role("support", f.org_x)).await.unwrap();
        let user = user_in(&f, "karim", f.org_x).await;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let engine = f.engine.clone();
            let root = root.clone();
            let req = assign(&user, &role);
            handles.push(tokio::spawn(async move {
                engine.change_assignment(&root, req).await.unwrap()
            }));
        }
        let mut created = 0;
        for h in handles {
            if h.await.unwrap().changed {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(f.engine.user_count(&root, role.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn revoke_keeps_history() {
        let f = fixture();
        let root = admin(f.org_x, true);
        let role = f.engine.create_role(&root, new_role("billing", f.org_x)).await.unwrap();
        let user = user_in(&f, "salma", f.org_x).await;
        f.engine.change_assignment(&root, assign(&user, &role)).await.unwrap();

        let mut revoke = assign(&user, &role);
        revoke.action = AssignAction::Revoke;
        revoke.reason = Some("left the team".into());
        let change = f.engine.change_assignment(&root, revoke).await.unwrap();
        assert!(change.changed);
        assert_eq!(change.action, "revoked");

        let history = f.engine.assignment_history(&root, user.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_active);
        assert_eq!(history[0].revoked_by, Some(root.user_id));
        assert_eq!(history[0].revocation_reason, "left the team");
        assert!(f.engine.effective_permissions(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn inactive_role_cannot_be_assigned() {
        let f = fixture();
        let root = admin(f.org_x, true);
        let role = f.engine.create_role(&root, new_role("old", f.org_x)).await.unwrap();
        f.engine
            .update_role(
                &root,
                role.id,
                RoleUpdate {
                    is_active: Some(false),
                    ..RoleUpdate::default()
                },
            )
            .await
            .unwrap();
        let user = user_in(&f, "u", f.org_x).await;
        assert_eq!(
            f.engine.change_assignment(&root, assign(&user, &role)).await.unwrap_err(),
            DomainError::not_found("Role not found or inactive")
        );
    }

    #[tokio::test]
    async fn system_role_delete_always_conflicts() {
        let f = fixture();
        let root = admin(f.org_x, true);
        let role = f.engine.ensure_super_admin_role(f.org_x, None).await.unwrap();
        assert_eq!(role.level, 1);
        assert!(role.permissions.contains(&WILDCARD));

        assert_eq!(
            f.engine.delete_role(&root, role.id).await.unwrap_err(),
            DomainError::conflict("System roles cannot be deleted")
        );
        let again = f.engine.ensure_super_admin_role(f.org_x, None).await.unwrap();
        assert_eq!(again.id, role.id);
    }

    #[tokio::test]
    async fn role_in_use_cannot_be_deleted() {
        let f = fixture();
        let root = admin(f.org_x, true);
        let role = f.engine.create_role(&root, new_role("billing", f.org_x)).await.unwrap();
        let user = user_in(&f, "u", f.org_x).await;
        f.engine.change_assignment(&root, assign(&user, &role)).await.unwrap();

        assert_eq!(
            f.engine.delete_role(&root, role.id).await.unwrap_err(),
            DomainError::conflict("Cannot delete role with active user assignments")
        );
    }

    #[tokio::test]
    async fn holders_of_foreign_role_are_forbidden() {
        let f = fixture();
        let root = admin(f.org_x, true);
        let role = f.engine.create_role(&root, new_role("billing", f.org_x)).await.unwrap();
        let foreign_staff = admin(f.org_y, false);

        assert_eq!(
            f.engine
                .list_users_for_role(&foreign_staff, role.id)
                .await
                .unwrap_err(),
            DomainError::authorization("Access denied")
        );
        assert_eq!(
            f.engine
                .list_users_for_role(&root, RoleId::new())
                .await
                .unwrap_err(),
            DomainError::not_found("Role not found")
        );
    }

    #[tokio::test]
    async fn tenant_listing_never_leaks_foreign_roles() {
        let f = fixture();
        let root = admin(f.org_x, true);
        f.engine.create_role(&root, new_role("x_role", f.org_x)).await.unwrap();
        f.engine.create_role(&root, new_role("y_role", f.org_y)).await.unwrap();

        let staff = admin(f.org_x, false);
        let mut filter = RoleFilter::scoped(crate::principal::OrgScope::All);
        filter.organization_id = Some(f.org_y);
        assert!(f.engine.list_roles(&staff, filter).await.unwrap().is_empty());

        let all = f
            .engine
            .list_roles(&root, RoleFilter::scoped(crate::principal::OrgScope::All))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
