//! Table definitions, applied idempotently at start-up.

use sqlx::PgPool;

use super::{map_sqlx_error, StoreError};

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS organizations (
        id                      UUID PRIMARY KEY,
        name                    TEXT NOT NULL,
        code                    TEXT NOT NULL,
        org_type                TEXT NOT NULL,
        email                   TEXT NOT NULL,
        phone                   TEXT NOT NULL,
        mobile                  TEXT NULL,
        website                 TEXT NULL,
        address                 TEXT NOT NULL,
        city                    TEXT NOT NULL,
        postal_code             TEXT NOT NULL,
        country                 TEXT NOT NULL,
        trade_license           TEXT NULL,
        tin_number              TEXT NULL,
        registration_number     TEXT NULL,
        currency                TEXT NOT NULL,
        revenue_sharing_enabled BOOLEAN NOT NULL,
        reseller_share          BIGINT NOT NULL,
        sub_reseller_share      BIGINT NOT NULL,
        ktl_share_with_sub      BIGINT NOT NULL,
        reseller_share_with_sub BIGINT NOT NULL,
        is_active               BOOLEAN NOT NULL,
        is_verified             BOOLEAN NOT NULL,
        created_by              UUID NULL,
        created_at              TIMESTAMPTZ NOT NULL,
        updated_at              TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS organizations_name_key ON organizations (name)",
    "CREATE UNIQUE INDEX IF NOT EXISTS organizations_code_key ON organizations (lower(code))",
    "CREATE UNIQUE INDEX IF NOT EXISTS organizations_email_key ON organizations (lower(email))",
    r#"
    CREATE TABLE IF NOT EXISTS billing_settings (
        organization_id                      UUID PRIMARY KEY REFERENCES organizations (id) ON DELETE CASCADE,
        max_manual_grace_days                BIGINT NOT NULL,
        disable_expiry                       BOOLEAN NOT NULL,
        default_grace_days                   BIGINT NOT NULL,
        jump_billing                         BOOLEAN NOT NULL,
        default_grace_hours                  BIGINT NOT NULL,
        max_inactive_days                    BIGINT NOT NULL,
        delete_permanent_disable_secret_days BIGINT NOT NULL,
        created_at                           TIMESTAMPTZ NOT NULL,
        updated_at                           TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_settings (
        organization_id                  UUID PRIMARY KEY REFERENCES organizations (id) ON DELETE CASCADE,
        sync_area_to_mikrotik            BOOLEAN NOT NULL,
        sync_address_to_mikrotik         BOOLEAN NOT NULL,
        sync_customer_mobile_to_mikrotik BOOLEAN NOT NULL,
        last_sync_status                 TEXT NOT NULL,
        sync_frequency                   TEXT NOT NULL,
        created_at                       TIMESTAMPTZ NOT NULL,
        updated_at                       TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id                    UUID PRIMARY KEY,
        login_id              TEXT NOT NULL,
        email                 TEXT NOT NULL,
        name                  TEXT NOT NULL,
        mobile                TEXT NULL,
        organization_id       UUID NOT NULL,
        employee_id           TEXT NULL,
        address               TEXT NULL,
        postal_code           TEXT NULL,
        language_preference   TEXT NOT NULL,
        timezone              TEXT NOT NULL,
        password_hash         TEXT NOT NULL,
        is_active             BOOLEAN NOT NULL,
        is_staff              BOOLEAN NOT NULL,
        is_super_admin        BOOLEAN NOT NULL,
        is_email_verified     BOOLEAN NOT NULL,
        is_phone_verified     BOOLEAN NOT NULL,
        failed_login_attempts BIGINT NOT NULL DEFAULT 0 CHECK (failed_login_attempts >= 0),
        locked_until          TIMESTAMPTZ NULL,
        session_access_token  TEXT NULL,
        session_refresh_token TEXT NULL,
        session_created_at    TIMESTAMPTZ NULL,
        session_expires_at    TIMESTAMPTZ NULL,
        session_remember_me   BOOLEAN NOT NULL DEFAULT FALSE,
        last_login            TIMESTAMPTZ NULL,
        created_at            TIMESTAMPTZ NOT NULL,
        updated_at            TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS users_login_id_key ON users (login_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS users_email_key ON users (lower(email))",
    "CREATE INDEX IF NOT EXISTS users_organization_idx ON users (organization_id)",
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id               UUID PRIMARY KEY,
        name             TEXT NOT NULL,
        display_name     TEXT NOT NULL,
        description      TEXT NOT NULL,
        organization_id  UUID NOT NULL,
        level            BIGINT NOT NULL CHECK (level >= 1),
        is_system_role   BOOLEAN NOT NULL,
        is_active        BOOLEAN NOT NULL,
        can_assign_roles BOOLEAN NOT NULL,
        max_assignments  BIGINT NULL,
        permissions      TEXT[] NOT NULL DEFAULT '{}',
        created_by       UUID NULL,
        created_at       TIMESTAMPTZ NOT NULL,
        updated_at       TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS roles_name_organization_key ON roles (organization_id, name)",
    r#"
    CREATE TABLE IF NOT EXISTS role_assignments (
        id                UUID PRIMARY KEY,
        user_id           UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        role_id           UUID NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
        assigned_by       UUID NOT NULL,
        assigned_at       TIMESTAMPTZ NOT NULL,
        expires_at        TIMESTAMPTZ NULL,
        is_active         BOOLEAN NOT NULL,
        assignment_reason TEXT NOT NULL DEFAULT '',
        revocation_reason TEXT NOT NULL DEFAULT '',
        revoked_by        UUID NULL,
        revoked_at        TIMESTAMPTZ NULL
    )
    "#,
    // At most one active assignment per (user, role).
    "CREATE UNIQUE INDEX IF NOT EXISTS role_assignments_active_key ON role_assignments (user_id, role_id) WHERE is_active",
    "CREATE INDEX IF NOT EXISTS role_assignments_user_idx ON role_assignments (user_id, assigned_at DESC)",
];

/// Create missing tables and indexes.
#[tracing::instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("ensure_schema", e))?;
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }
    tx.commit().await.map_err(|e| map_sqlx_error("ensure_schema", e))?;
    tracing::debug!(statements = STATEMENTS.len(), "schema ensured");
    Ok(())
}
