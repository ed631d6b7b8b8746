//! `RoleStore` over the `roles` and `role_assignments` tables.
//!
//! `assign` and `delete_role` both lock the role row first, so a deletion
//! cannot interleave with an assignment to the same role and the
//! `max_assignments` count is read under the same lock that the insert
//! commits under.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use netdesk_auth::roles::{capacity_reached, AssignOutcome, NewAssignment, Revocation};
use netdesk_auth::{Permission, Role, RoleAssignment, RoleFilter, RoleStore};
use netdesk_core::{AssignmentId, DomainError, DomainResult, OrganizationId, RoleId, UserId};

use super::{db, to_u32};

const ROLE_COLUMNS: &str = r#"
    id, name, display_name, description, organization_id, level, is_system_role,
    is_active, can_assign_roles, max_assignments, permissions, created_by,
    created_at, updated_at
"#;

const ASSIGNMENT_COLUMNS: &str = r#"
    id, user_id, role_id, assigned_by, assigned_at, expires_at, is_active,
    assignment_reason, revocation_reason, revoked_by, revoked_at
"#;

fn role_not_found() -> DomainError {
    DomainError::not_found("Role not found")
}

fn role_from_row(row: &PgRow) -> Result<Role, sqlx::Error> {
    let permissions: Vec<String> = row.try_get("permissions")?;
    let max_assignments: Option<i64> = row.try_get("max_assignments")?;
    let created_by: Option<uuid::Uuid> = row.try_get("created_by")?;
    Ok(Role {
        id: RoleId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        display_name: row.try_get("display_name")?,
        description: row.try_get("description")?,
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        level: to_u32(row.try_get("level")?, "level")?,
        is_system_role: row.try_get("is_system_role")?,
        is_active: row.try_get("is_active")?,
        can_assign_roles: row.try_get("can_assign_roles")?,
        max_assignments: max_assignments
            .map(|v| to_u32(v, "max_assignments"))
            .transpose()?,
        permissions: permissions.into_iter().map(Permission::new).collect(),
        created_by: created_by.map(UserId::from_uuid),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn assignment_from_row(row: &PgRow) -> Result<RoleAssignment, sqlx::Error> {
    let revoked_by: Option<uuid::Uuid> = row.try_get("revoked_by")?;
    Ok(RoleAssignment {
        id: AssignmentId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        role_id: RoleId::from_uuid(row.try_get("role_id")?),
        assigned_by: UserId::from_uuid(row.try_get("assigned_by")?),
        assigned_at: row.try_get("assigned_at")?,
        expires_at: row.try_get("expires_at")?,
        is_active: row.try_get("is_active")?,
        assignment_reason: row.try_get("assignment_reason")?,
        revocation_reason: row.try_get("revocation_reason")?,
        revoked_by: revoked_by.map(UserId::from_uuid),
        revoked_at: row.try_get("revoked_at")?,
    })
}

fn permission_codes(role: &Role) -> Vec<String> {
    role.permissions.iter().map(|p| p.as_str().to_string()).collect()
}

/// Lock the role row for the rest of the transaction.
async fn lock_role(
    tx: &mut Transaction<'_, Postgres>,
    id: RoleId,
    operation: &'static str,
) -> DomainResult<Role> {
    let row = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 FOR UPDATE"))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(db(operation))?
        .ok_or_else(role_not_found)?;
    role_from_row(&row).map_err(db(operation))
}

#[derive(Debug, Clone)]
pub struct PostgresRoleStore {
    pool: PgPool,
}

impl PostgresRoleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for PostgresRoleStore {
    #[instrument(skip(self, role), fields(role_id = %role.id, name = %role.name))]
    async fn insert_role(&self, role: Role) -> DomainResult<Role> {
        sqlx::query(&format!(
            r#"
            INSERT INTO roles ({ROLE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#
        ))
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(role.organization_id.as_uuid())
        .bind(i64::from(role.level))
        .bind(role.is_system_role)
        .bind(role.is_active)
        .bind(role.can_assign_roles)
        .bind(role.max_assignments.map(i64::from))
        .bind(permission_codes(&role))
        .bind(role.created_by.map(|u| *u.as_uuid()))
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db("insert_role"))?;
        Ok(role)
    }

    #[instrument(skip(self))]
    async fn get_role(&self, id: RoleId) -> DomainResult<Option<Role>> {
        let row = sqlx::query(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db("get_role"))?;
        row.as_ref().map(role_from_row).transpose().map_err(db("get_role"))
    }

    #[instrument(skip(self))]
    async fn list_roles(&self, filter: &RoleFilter) -> DomainResult<Vec<Role>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ROLE_COLUMNS} FROM roles
            WHERE ($1::uuid IS NULL OR organization_id = $1)
              AND ($2::uuid IS NULL OR organization_id = $2)
              AND ($3::boolean IS NULL OR is_active = $3)
              AND ($4::boolean IS NULL OR is_system_role = $4)
              AND ($5::bigint IS NULL OR level = $5)
              AND ($6::text IS NULL
                   OR strpos(lower(name), lower($6)) > 0
                   OR strpos(lower(display_name), lower($6)) > 0
                   OR strpos(lower(description), lower($6)) > 0)
            ORDER BY level ASC, display_name ASC
            "#
        ))
        .bind(filter.scope.organization().map(|o| *o.as_uuid()))
        .bind(filter.organization_id.map(|o| *o.as_uuid()))
        .bind(filter.is_active)
        .bind(filter.is_system_role)
        .bind(filter.level.map(i64::from))
        .bind(filter.search.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(db("list_roles"))?;

        rows.iter()
            .map(role_from_row)
            .collect::<Result<_, _>>()
            .map_err(db("list_roles"))
    }

    #[instrument(skip(self, role), fields(role_id = %role.id))]
    async fn update_role(&self, role: &Role) -> DomainResult<Role> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE roles
            SET display_name = $2, description = $3, level = $4, is_active = $5,
                can_assign_roles = $6, max_assignments = $7, permissions = $8,
                updated_at = $9
            WHERE id = $1
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(role.id.as_uuid())
        .bind(&role.display_name)
        .bind(&role.description)
        .bind(i64::from(role.level))
        .bind(role.is_active)
        .bind(role.can_assign_roles)
        .bind(role.max_assignments.map(i64::from))
        .bind(permission_codes(role))
        .bind(role.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db("update_role"))?
        .ok_or_else(role_not_found)?;
        role_from_row(&row).map_err(db("update_role"))
    }

    #[instrument(skip(self))]
    async fn delete_role(&self, id: RoleId) -> DomainResult<()> {
        let mut tx = self.pool.begin().await.map_err(db("delete_role"))?;

        let role = lock_role(&mut tx, id, "delete_role").await?;
        if role.is_system_role {
            return Err(DomainError::conflict("System roles cannot be deleted"));
        }

        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM role_assignments WHERE role_id = $1 AND is_active)",
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(db("delete_role"))?;
        if in_use {
            return Err(DomainError::conflict(
                "Cannot delete role with active user assignments",
            ));
        }

        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db("delete_role"))?;

        tx.commit().await.map_err(db("delete_role"))?;
        Ok(())
    }

    #[instrument(skip(self, assignment), fields(user_id = %assignment.user_id, role_id = %assignment.role_id))]
    async fn assign(
        &self,
        assignment: NewAssignment,
        max_assignments: Option<u32>,
    ) -> DomainResult<AssignOutcome> {
        let mut tx = self.pool.begin().await.map_err(db("assign"))?;
        lock_role(&mut tx, assignment.role_id, "assign").await?;

        let existing = sqlx::query(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM role_assignments
            WHERE user_id = $1 AND role_id = $2 AND is_active
            "#
        ))
        .bind(assignment.user_id.as_uuid())
        .bind(assignment.role_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db("assign"))?;
        if let Some(row) = existing {
            let found = assignment_from_row(&row).map_err(db("assign"))?;
            return Ok(AssignOutcome::AlreadyAssigned(found));
        }

        if let Some(max) = max_assignments {
            let holders: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM role_assignments WHERE role_id = $1 AND is_active",
            )
            .bind(assignment.role_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(db("assign"))?;
            if holders >= i64::from(max) {
                return Err(capacity_reached(max));
            }
        }

        let created = assignment.into_assignment();
        sqlx::query(&format!(
            r#"
            INSERT INTO role_assignments ({ASSIGNMENT_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#
        ))
        .bind(created.id.as_uuid())
        .bind(created.user_id.as_uuid())
        .bind(created.role_id.as_uuid())
        .bind(created.assigned_by.as_uuid())
        .bind(created.assigned_at)
        .bind(created.expires_at)
        .bind(created.is_active)
        .bind(&created.assignment_reason)
        .bind(&created.revocation_reason)
        .bind(created.revoked_by.map(|u| *u.as_uuid()))
        .bind(created.revoked_at)
        .execute(&mut *tx)
        .await
        .map_err(db("assign"))?;

        tx.commit().await.map_err(db("assign"))?;
        Ok(AssignOutcome::Created(created))
    }

    #[instrument(skip(self, revocation), fields(user_id = %revocation.user_id, role_id = %revocation.role_id))]
    async fn revoke(&self, revocation: Revocation) -> DomainResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE role_assignments
            SET is_active = FALSE, revoked_at = $3, revoked_by = $4, revocation_reason = $5
            WHERE user_id = $1 AND role_id = $2 AND is_active
            "#,
        )
        .bind(revocation.user_id.as_uuid())
        .bind(revocation.role_id.as_uuid())
        .bind(revocation.at)
        .bind(revocation.revoked_by.as_uuid())
        .bind(&revocation.reason)
        .execute(&self.pool)
        .await
        .map_err(db("revoke"))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn active_assignments_for_role(&self, role_id: RoleId) -> DomainResult<Vec<RoleAssignment>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM role_assignments
            WHERE role_id = $1 AND is_active
            ORDER BY assigned_at ASC
            "#
        ))
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db("active_assignments_for_role"))?;
        rows.iter()
            .map(assignment_from_row)
            .collect::<Result<_, _>>()
            .map_err(db("active_assignments_for_role"))
    }

    #[instrument(skip(self))]
    async fn assignment_history(&self, user_id: UserId) -> DomainResult<Vec<RoleAssignment>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM role_assignments
            WHERE user_id = $1
            ORDER BY assigned_at DESC
            "#
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db("assignment_history"))?;
        rows.iter()
            .map(assignment_from_row)
            .collect::<Result<_, _>>()
            .map_err(db("assignment_history"))
    }

    #[instrument(skip(self))]
    async fn roles_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> DomainResult<Vec<Role>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ROLE_COLUMNS} FROM roles r
            WHERE r.is_active
              AND EXISTS (
                SELECT 1 FROM role_assignments a
                WHERE a.role_id = r.id AND a.user_id = $1 AND a.is_active
                  AND (a.expires_at IS NULL OR a.expires_at > $2)
              )
            ORDER BY r.level ASC, r.name ASC
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db("roles_for_user"))?;
        rows.iter()
            .map(role_from_row)
            .collect::<Result<_, _>>()
            .map_err(db("roles_for_user"))
    }

    #[instrument(skip(self))]
    async fn count_active_assignments(&self, role_id: RoleId) -> DomainResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM role_assignments WHERE role_id = $1 AND is_active",
        )
        .bind(role_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(db("count_active_assignments"))?;
        Ok(count.max(0) as u64)
    }
}
