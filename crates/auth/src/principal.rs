use std::collections::BTreeSet;

use serde::Serialize;

use netdesk_core::{OrganizationId, UserId};

use crate::claims::Claims;
use crate::Permission;

/// Identity of an authenticated caller, derived from a verified access token.
///
/// This is deliberately not a `User`: it carries only what authorization
/// decisions need and is never written back to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub is_super_admin: bool,
    pub is_staff: bool,
    pub login_id: String,
    pub permissions: BTreeSet<Permission>,
}

impl Principal {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.user_id,
            organization_id: claims.organization_id,
            is_super_admin: claims.is_super_admin,
            is_staff: claims.is_staff,
            login_id: claims.login_id.clone(),
            permissions: claims.permissions.iter().cloned().collect(),
        }
    }

    /// Super admins and staff may perform administrative writes.
    pub fn is_admin(&self) -> bool {
        self.is_super_admin || self.is_staff
    }

    /// Organization scope applied to every collection this principal reads.
    pub fn scope(&self) -> OrgScope {
        if self.is_super_admin {
            OrgScope::All
        } else {
            OrgScope::Only(self.organization_id)
        }
    }
}

/// Outcome of resolving a request's credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Authenticated(Principal),
}

impl Identity {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(p) => Some(p),
        }
    }
}

/// Row-level tenant filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgScope {
    All,
    Only(OrganizationId),
}

impl OrgScope {
    pub fn admits(&self, organization_id: &OrganizationId) -> bool {
        match self {
            OrgScope::All => true,
            OrgScope::Only(own) => own == organization_id,
        }
    }

    pub fn organization(&self) -> Option<OrganizationId> {
        match self {
            OrgScope::All => None,
            OrgScope::Only(org) => Some(*org),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{users, WILDCARD};

    fn principal(perms: &[Permission]) -> Principal {
        Principal {
            user_id: UserId::new(),
            organization_id: OrganizationId::new(),
            is_super_admin: false,
            is_staff: false,
            login_id: "p".to_string(),
            permissions: perms.iter().cloned().collect(),
        }
    }

    #[test]
    fn claims_carry_permissions_and_super_admin_sees_everything() {
        let p = principal(&[users::VIEW, WILDCARD]);
        assert!(p.permissions.contains(&users::VIEW));
        assert!(p.permissions.contains(&WILDCARD));

        let mut root = principal(&[]);
        root.is_super_admin = true;
        assert!(root.is_admin());
        assert_eq!(root.scope(), OrgScope::All);
    }

    #[test]
    fn tenant_scope_admits_only_own_organization() {
        let p = principal(&[]);
        let scope = p.scope();
        assert!(scope.admits(&p.organization_id));
        assert!(!scope.admits(&OrganizationId::new()));
    }
}
