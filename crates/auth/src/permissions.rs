use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use netdesk_core::{DomainError, DomainResult};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings in `area.action` form (e.g.
/// `"users.view"`). The wildcard `"*"` grants everything and is what the
/// bootstrap super-admin role carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Grouping key used by the "my permissions" view: text before the first
    /// dot, or `general` when there is none.
    pub fn area(&self) -> &str {
        match self.as_str().split_once('.') {
            Some((area, _)) => area,
            None => "general",
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const WILDCARD: Permission = Permission::from_static("*");

pub mod users {
    use super::Permission;

    pub const VIEW: Permission = Permission::from_static("users.view");
    pub const CREATE: Permission = Permission::from_static("users.create");
    pub const UPDATE: Permission = Permission::from_static("users.update");
    pub const DELETE: Permission = Permission::from_static("users.delete");
}

pub mod roles {
    use super::Permission;

    pub const VIEW: Permission = Permission::from_static("roles.view");
    pub const CREATE: Permission = Permission::from_static("roles.create");
    pub const UPDATE: Permission = Permission::from_static("roles.update");
    pub const DELETE: Permission = Permission::from_static("roles.delete");
    pub const ASSIGN: Permission = Permission::from_static("roles.assign");
}

pub mod organizations {
    use super::Permission;

    pub const VIEW: Permission = Permission::from_static("organizations.view");
    pub const UPDATE: Permission = Permission::from_static("organizations.update");
    pub const VERIFY: Permission = Permission::from_static("organizations.verify");
}

pub mod billing {
    use super::Permission;

    pub const VIEW: Permission = Permission::from_static("billing.view");
    pub const MANAGE: Permission = Permission::from_static("billing.manage");
}

pub mod sync {
    use super::Permission;

    pub const VIEW: Permission = Permission::from_static("sync.view");
    pub const MANAGE: Permission = Permission::from_static("sync.manage");
}

/// Catalogue entry shown to administrators when composing roles.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionDefinition {
    pub code: Permission,
    pub area: String,
    pub description: &'static str,
}

/// Every permission a role may carry (the wildcard excluded).
pub fn catalogue() -> Vec<PermissionDefinition> {
    let entries: [(Permission, &'static str); 16] = [
        (users::VIEW, "View users of the organization"),
        (users::CREATE, "Create users"),
        (users::UPDATE, "Update user profiles"),
        (users::DELETE, "Deactivate users"),
        (roles::VIEW, "View roles and their holders"),
        (roles::CREATE, "Create roles"),
        (roles::UPDATE, "Update roles"),
        (roles::DELETE, "Delete roles"),
        (roles::ASSIGN, "Assign and revoke roles"),
        (organizations::VIEW, "View organization details"),
        (organizations::UPDATE, "Update organization details"),
        (organizations::VERIFY, "Mark organizations as verified"),
        (billing::VIEW, "View billing settings"),
        (billing::MANAGE, "Change billing settings"),
        (sync::VIEW, "View router/OLT sync settings"),
        (sync::MANAGE, "Change router/OLT sync settings"),
    ];

    entries
        .into_iter()
        .map(|(code, description)| PermissionDefinition {
            area: code.area().to_string(),
            code,
            description,
        })
        .collect()
}

/// Reject permission codes that are neither catalogued nor the wildcard.
pub fn validate_permissions(perms: &[Permission]) -> DomainResult<BTreeSet<Permission>> {
    let known: BTreeSet<Permission> = catalogue().into_iter().map(|d| d.code).collect();
    let mut out = BTreeSet::new();
    for perm in perms {
        if !perm.is_wildcard() && !known.contains(perm) {
            return Err(DomainError::validation(format!(
                "Unknown permission: {}",
                perm.as_str()
            )));
        }
        out.insert(perm.clone());
    }
    Ok(out)
}

/// Group codes by area for display.
pub fn group_by_area<'a>(
    perms: impl IntoIterator<Item = &'a Permission>,
) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for perm in perms {
        grouped
            .entry(perm.area().to_string())
            .or_default()
            .push(perm.as_str().to_string());
    }
    grouped
}
