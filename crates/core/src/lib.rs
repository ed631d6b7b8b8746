//! `netdesk-core`: shared building blocks for the back office.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{AssignmentId, OrganizationId, RoleId, UserId};
