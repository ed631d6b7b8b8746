//! Postgres-backed stores.
//!
//! All queries are runtime-checked `sqlx::query` calls against the schema in
//! [`schema`]. Check-then-write operations run inside a transaction that
//! first takes a row lock (`SELECT ... FOR UPDATE`) on the row they guard, and
//! uniqueness is enforced by indexes so concurrent writers surface as
//! SQLSTATE 23505, which maps to a Conflict carrying the user-facing message
//! for the violated index.
//!
//! ## Error Mapping
//!
//! | SQLx error | StoreError | DomainError |
//! |------------|------------|-------------|
//! | Database `23505` | `Conflict` | `Conflict` |
//! | Database, other codes | `Query` | `Internal` |
//! | `PoolTimedOut`, `PoolClosed`, `Io`, `Tls` | `Unavailable` | `ServiceCommunication` |
//! | Decode failures | `Corrupt` | `Internal` |

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use netdesk_core::DomainError;

pub mod organizations;
pub mod roles;
pub mod schema;
pub mod users;

pub use organizations::PostgresOrganizationStore;
pub use roles::PostgresRoleStore;
pub use schema::ensure_schema;
pub use users::PostgresUserStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness rule was violated; the message is safe to show.
    #[error("{0}")]
    Conflict(String),

    #[error("database unavailable during {operation}: {message}")]
    Unavailable { operation: String, message: String },

    #[error("undecodable row in {operation}: {message}")]
    Corrupt { operation: String, message: String },

    #[error("database error in {operation}: {message}")]
    Query { operation: String, message: String },
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => DomainError::conflict(msg),
            StoreError::Unavailable { .. } => DomainError::service(value.to_string()),
            StoreError::Corrupt { .. } | StoreError::Query { .. } => {
                tracing::error!(error = %value, "store failure");
                DomainError::internal(value.to_string())
            }
        }
    }
}

/// Open a pool sized for the API server.
pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// User-facing message for a violated unique index.
pub(crate) fn conflict_message(constraint: Option<&str>) -> String {
    match constraint {
        Some("users_login_id_key") => "A user with this login ID already exists",
        Some("users_email_key") => "A user with this email already exists",
        Some("roles_name_organization_key") => "Role with this name already exists in this organization",
        Some("role_assignments_active_key") => "User already has this role",
        Some("organizations_name_key") => "Organization with this name already exists.",
        Some("organizations_code_key") => "Organization with this code already exists.",
        Some("organizations_email_key") => "Organization with this email already exists.",
        _ => "Resource already exists",
    }
    .to_string()
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    let operation = operation.to_string();
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Conflict(conflict_message(db_err.constraint()));
            }
            StoreError::Query {
                operation,
                message: db_err.message().to_string(),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Unavailable {
                operation,
                message: err.to_string(),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt {
                operation,
                message: err.to_string(),
            }
        }
        other => StoreError::Query {
            operation,
            message: other.to_string(),
        },
    }
}

/// `map_err` adapter straight to `DomainError`.
pub(crate) fn db(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DomainError {
    move |err| map_sqlx_error(operation, err).into()
}

/// Counters are `BIGINT` columns holding `u32` values.
pub(crate) fn to_u32(value: i64, column: &str) -> Result<u32, sqlx::Error> {
    u32::try_from(value).map_err(|_| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("{value} is out of range for u32").into(),
    })
}

/// Decode failure for a text column holding an enum value.
pub(crate) fn bad_value(column: &str, err: DomainError) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    }
}

/// Database-backed tests run only when `TEST_DATABASE_URL` points at a
/// scratch database.
#[cfg(test)]
pub(crate) async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = connect(&url, Duration::from_secs(5)).await.ok()?;
    ensure_schema(&pool).await.ok()?;
    Some(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_indexes_map_to_user_facing_messages() {
        assert_eq!(
            conflict_message(Some("users_login_id_key")),
            "A user with this login ID already exists"
        );
        assert_eq!(
            conflict_message(Some("organizations_code_key")),
            "Organization with this code already exists."
        );
        assert_eq!(conflict_message(None), "Resource already exists");
    }

    #[test]
    fn pool_failures_are_service_errors() {
        let err = map_sqlx_error("get_user", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert!(matches!(DomainError::from(err), DomainError::ServiceCommunication(_)));
    }

    #[test]
    fn conflicts_keep_their_message() {
        let err = DomainError::from(StoreError::Conflict("Role with this name already exists in this organization".into()));
        assert_eq!(
            err,
            DomainError::conflict("Role with this name already exists in this organization")
        );
    }

    #[test]
    fn out_of_range_counters_do_not_decode() {
        assert_eq!(to_u32(5, "level").unwrap(), 5);
        assert!(to_u32(-1, "level").is_err());
        assert!(matches!(
            map_sqlx_error("list_roles", to_u32(-1, "level").unwrap_err()),
            StoreError::Corrupt { .. }
        ));
    }
}
