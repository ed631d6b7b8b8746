//! Roles, role assignments and the role store port.
//!
//! `RoleAssignment` rows are the only record of who holds which role. They are
//! created on assignment and flipped inactive on revocation, never deleted.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use netdesk_core::{AssignmentId, DomainError, DomainResult, OrganizationId, RoleId, UserId};

use crate::principal::OrgScope;
use crate::Permission;

pub const DEFAULT_ROLE_LEVEL: u32 = 10;
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

/// Conflict raised when a capped role already has `max` active holders.
pub fn capacity_reached(max: u32) -> DomainError {
    DomainError::conflict(format!("Role has reached its maximum of {max} assignments"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub organization_id: OrganizationId,
    /// Lower means more authority (1 = super admin).
    pub level: u32,
    pub is_system_role: bool,
    pub is_active: bool,
    pub can_assign_roles: bool,
    pub max_assignments: Option<u32>,
    pub permissions: BTreeSet<Permission>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for role creation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub organization_id: OrganizationId,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub is_system_role: bool,
    #[serde(default)]
    pub can_assign_roles: bool,
    #[serde(default)]
    pub max_assignments: Option<u32>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

fn default_level() -> u32 {
    DEFAULT_ROLE_LEVEL
}

impl NewRole {
    pub fn validate(&self) -> DomainResult<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("Role name is required"));
        }
        if name.chars().count() > 150 {
            return Err(DomainError::validation("Role name must be at most 150 characters"));
        }
        if self.display_name.trim().is_empty() {
            return Err(DomainError::validation("Display name is required"));
        }
        if self.level == 0 {
            return Err(DomainError::validation("Role level must be at least 1"));
        }
        Ok(())
    }

    pub fn into_role(
        self,
        permissions: BTreeSet<Permission>,
        created_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Role {
        Role {
            id: RoleId::new(),
            name: self.name.trim().to_string(),
            display_name: self.display_name,
            description: self.description,
            organization_id: self.organization_id,
            level: self.level,
            is_system_role: self.is_system_role,
            is_active: true,
            can_assign_roles: self.can_assign_roles,
            max_assignments: self.max_assignments,
            permissions,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; name and organization are immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoleUpdate {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub level: Option<u32>,
    pub is_active: Option<bool>,
    pub can_assign_roles: Option<bool>,
    pub max_assignments: Option<u32>,
    pub permissions: Option<Vec<Permission>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleAssignment {
    pub id: AssignmentId,
    pub user_id: UserId,
    pub role_id: RoleId,
    pub assigned_by: UserId,
    pub assigned_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub assignment_reason: String,
    pub revocation_reason: String,
    pub revoked_by: Option<UserId>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Request to create an assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub assigned_by: UserId,
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

impl RoleAssignment {
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|exp| exp > now)
    }
}

impl NewAssignment {
    pub fn into_assignment(self) -> RoleAssignment {
        RoleAssignment {
            id: AssignmentId::new(),
            user_id: self.user_id,
            role_id: self.role_id,
            assigned_by: self.assigned_by,
            assigned_at: self.at,
            expires_at: self.expires_at,
            is_active: true,
            assignment_reason: self.reason,
            revocation_reason: String::new(),
            revoked_by: None,
            revoked_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    Created(RoleAssignment),
    /// The pair already had an active assignment; nothing was written.
    AlreadyAssigned(RoleAssignment),
}

impl AssignOutcome {
    pub fn assignment(&self) -> &RoleAssignment {
        match self {
            AssignOutcome::Created(a) | AssignOutcome::AlreadyAssigned(a) => a,
        }
    }
}

/// Revocation details applied to every matching active assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub revoked_by: UserId,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFilter {
    pub scope: OrgScope,
    pub organization_id: Option<OrganizationId>,
    pub is_active: Option<bool>,
    pub is_system_role: Option<bool>,
    pub level: Option<u32>,
    pub search: Option<String>,
}

impl RoleFilter {
    pub fn scoped(scope: OrgScope) -> Self {
        Self {
            scope,
            organization_id: None,
            is_active: None,
            is_system_role: None,
            level: None,
            search: None,
        }
    }

    pub fn matches(&self, role: &Role) -> bool {
        if !self.scope.admits(&role.organization_id) {
            return false;
        }
        if matches!(self.organization_id, Some(org) if org != role.organization_id) {
            return false;
        }
        if matches!(self.is_active, Some(v) if v != role.is_active) {
            return false;
        }
        if matches!(self.is_system_role, Some(v) if v != role.is_system_role) {
            return false;
        }
        if matches!(self.level, Some(v) if v != role.level) {
            return false;
        }
        if let Some(term) = self.search.as_deref().map(str::to_lowercase) {
            return [&role.name, &role.display_name, &role.description]
                .iter()
                .any(|f| f.to_lowercase().contains(&term));
        }
        true
    }
}

/// Persistence port for roles and assignments.
///
/// Check-then-write operations (`insert_role`, `assign`, `delete_role`) must be
/// atomic in the implementation: a single lock, a transaction with row locks,
/// or a unique index.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Conflict when (name, organization) already exists.
    async fn insert_role(&self, role: Role) -> DomainResult<Role>;

    async fn get_role(&self, id: RoleId) -> DomainResult<Option<Role>>;

    /// Ordered by level, then display name.
    async fn list_roles(&self, filter: &RoleFilter) -> DomainResult<Vec<Role>>;

    async fn update_role(&self, role: &Role) -> DomainResult<Role>;

    /// Conflict when the role is a system role or has active assignments at
    /// the moment of deletion.
    async fn delete_role(&self, id: RoleId) -> DomainResult<()>;

    /// Create an active assignment unless one exists for the pair. When
    /// `max_assignments` is set and already reached, Conflict.
    async fn assign(
        &self,
        assignment: NewAssignment,
        max_assignments: Option<u32>,
    ) -> DomainResult<AssignOutcome>;

    /// Deactivate every active assignment of the pair; returns how many.
    async fn revoke(&self, revocation: Revocation) -> DomainResult<u64>;

    async fn active_assignments_for_role(&self, role_id: RoleId) -> DomainResult<Vec<RoleAssignment>>;

    /// Every assignment of the user, active or not, newest first.
    async fn assignment_history(&self, user_id: UserId) -> DomainResult<Vec<RoleAssignment>>;

    /// Active roles held through active, unexpired assignments at `now`.
    async fn roles_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<Vec<Role>>;

    async fn count_active_assignments(&self, role_id: RoleId) -> DomainResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_role(name: &str) -> NewRole {
        NewRole {
            name: name.to_string(),
            display_name: "Billing Manager".to_string(),
            description: "Handles invoices".to_string(),
            organization_id: OrganizationId::new(),
            level: DEFAULT_ROLE_LEVEL,
            is_system_role: false,
            can_assign_roles: false,
            max_assignments: None,
            permissions: vec![],
        }
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(new_role("billing").validate().is_ok());
        assert!(new_role("   ").validate().is_err());

        let mut zero = new_role("x");
        zero.level = 0;
        assert!(zero.validate().is_err());
    }

    #[test]
    fn level_defaults_to_ten_when_deserialized() {
        let org = OrganizationId::new();
        let role: NewRole = serde_json::from_value(serde_json::json!({
            "name": "support",
            "display_name": "Support",
            "organization_id": org,
        }))
        .unwrap();
        assert_eq!(role.level, DEFAULT_ROLE_LEVEL);
        assert!(role.permissions.is_empty());
    }

    #[test]
    fn filter_search_covers_display_name() {
        let role = new_role("billing").into_role(BTreeSet::new(), None, Utc::now());
        let mut filter = RoleFilter::scoped(OrgScope::All);
        filter.search = Some("manager".into());
        assert!(filter.matches(&role));
        filter.search = Some("noc".into());
        assert!(!filter.matches(&role));
    }
}
