//! `netdesk-auth`: credentials, tokens, roles and the authorization guard.
//!
//! Storage and transport stay outside this crate; everything that touches
//! them is an `async_trait` port implemented in `netdesk-infra` (or by the
//! in-memory implementations in [`memory`]).

pub mod accounts;
pub mod authorize;
pub mod claims;
pub mod credentials;
pub mod directory;
pub mod engine;
pub mod memory;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod session;
pub mod tokens;
pub mod user;

pub use accounts::{AccountService, Bootstrap, ChangePassword, NewUser, PermissionsView, UserView};
pub use authorize::{ensure_same_organization, require_admin, require_super_admin, AuthorizationGuard};
pub use claims::{validate_claims, Claims, TokenKind, TokenValidationError};
pub use credentials::{AuthFailure, CredentialStore, LockoutPolicy};
pub use directory::OrganizationDirectory;
pub use engine::{AssignAction, AssignRequest, RoleChange, RoleEngine, RoleHolder};
pub use permissions::Permission;
pub use principal::{Identity, OrgScope, Principal};
pub use roles::{NewRole, Role, RoleAssignment, RoleFilter, RoleStore, RoleUpdate};
pub use session::{AuthService, LoginOutcome, LoginRequest, LogoutRequest};
pub use tokens::{
    BlacklistError, TokenBlacklist, TokenError, TokenLifetimes, TokenPair, TokenService,
    TokenSubject,
};
pub use user::{User, UserFilter, UserProfileUpdate, UserStore};
