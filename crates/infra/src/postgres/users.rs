//! `UserStore` over the `users` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use netdesk_auth::user::{FailedLogin, Language, StoredSession};
use netdesk_auth::{User, UserFilter, UserProfileUpdate, UserStore};
use netdesk_core::{DomainError, DomainResult, OrganizationId, UserId};

use super::{bad_value, db, to_u32};

const COLUMNS: &str = r#"
    id, login_id, email, name, mobile, organization_id, employee_id, address,
    postal_code, language_preference, timezone, password_hash, is_active,
    is_staff, is_super_admin, is_email_verified, is_phone_verified,
    failed_login_attempts, locked_until, session_access_token,
    session_refresh_token, session_created_at, session_expires_at,
    session_remember_me, last_login, created_at, updated_at
"#;

fn not_found() -> DomainError {
    DomainError::not_found("User not found")
}

fn session_from_row(row: &PgRow) -> Result<Option<StoredSession>, sqlx::Error> {
    let access: Option<String> = row.try_get("session_access_token")?;
    let refresh: Option<String> = row.try_get("session_refresh_token")?;
    let created_at: Option<DateTime<Utc>> = row.try_get("session_created_at")?;
    let expires_at: Option<DateTime<Utc>> = row.try_get("session_expires_at")?;
    Ok(match (access, refresh, created_at, expires_at) {
        (Some(access_token), Some(refresh_token), Some(created_at), Some(expires_at)) => Some(StoredSession {
            access_token,
            refresh_token,
            created_at,
            expires_at,
            remember_me: row.try_get("session_remember_me")?,
        }),
        _ => None,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let language: String = row.try_get("language_preference")?;
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        login_id: row.try_get("login_id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        mobile: row.try_get("mobile")?,
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        employee_id: row.try_get("employee_id")?,
        address: row.try_get("address")?,
        postal_code: row.try_get("postal_code")?,
        language_preference: Language::parse(&language)
            .map_err(|e| bad_value("language_preference", e))?,
        timezone: row.try_get("timezone")?,
        password_hash: row.try_get("password_hash")?,
        is_active: row.try_get("is_active")?,
        is_staff: row.try_get("is_staff")?,
        is_super_admin: row.try_get("is_super_admin")?,
        is_email_verified: row.try_get("is_email_verified")?,
        is_phone_verified: row.try_get("is_phone_verified")?,
        failed_login_attempts: to_u32(row.try_get("failed_login_attempts")?, "failed_login_attempts")?,
        locked_until: row.try_get("locked_until")?,
        session: session_from_row(row)?,
        last_login: row.try_get("last_login")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: UserId, operation: &'static str) -> DomainResult<User> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db(operation))?
            .ok_or_else(not_found)?;
        user_from_row(&row).map_err(db(operation))
    }
}

#[async_trait]
impl UserStore for PostgresUserStore {
    #[instrument(skip(self, user), fields(user_id = %user.id, login_id = %user.login_id))]
    async fn insert(&self, user: User) -> DomainResult<User> {
        sqlx::query(&format!(
            r#"
            INSERT INTO users ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
            "#
        ))
        .bind(user.id.as_uuid())
        .bind(&user.login_id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.mobile)
        .bind(user.organization_id.as_uuid())
        .bind(&user.employee_id)
        .bind(&user.address)
        .bind(&user.postal_code)
        .bind(user.language_preference.as_str())
        .bind(&user.timezone)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.is_staff)
        .bind(user.is_super_admin)
        .bind(user.is_email_verified)
        .bind(user.is_phone_verified)
        .bind(i64::from(user.failed_login_attempts))
        .bind(user.locked_until)
        .bind(user.session.as_ref().map(|s| s.access_token.clone()))
        .bind(user.session.as_ref().map(|s| s.refresh_token.clone()))
        .bind(user.session.as_ref().map(|s| s.created_at))
        .bind(user.session.as_ref().map(|s| s.expires_at))
        .bind(user.session.as_ref().is_some_and(|s| s.remember_me))
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db("insert_user"))?;
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: UserId) -> DomainResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db("get_user"))?;
        row.as_ref().map(user_from_row).transpose().map_err(db("get_user"))
    }

    #[instrument(skip(self))]
    async fn find_by_login_id(&self, login_id: &str) -> DomainResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM users WHERE login_id = $1"))
            .bind(login_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("find_by_login_id"))?;
        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(db("find_by_login_id"))
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &UserFilter) -> DomainResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM users
            WHERE ($1::uuid IS NULL OR organization_id = $1)
              AND ($2::uuid IS NULL OR organization_id = $2)
              AND ($3::boolean IS NULL OR is_active = $3)
              AND ($4::boolean IS NULL OR is_staff = $4)
              AND ($5::boolean IS NULL OR is_super_admin = $5)
              AND ($6::text IS NULL
                   OR strpos(lower(login_id), lower($6)) > 0
                   OR strpos(lower(email), lower($6)) > 0
                   OR strpos(lower(name), lower($6)) > 0
                   OR strpos(lower(coalesce(employee_id, '')), lower($6)) > 0)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(filter.scope.organization().map(|o| *o.as_uuid()))
        .bind(filter.organization_id.map(|o| *o.as_uuid()))
        .bind(filter.is_active)
        .bind(filter.is_staff)
        .bind(filter.is_super_admin)
        .bind(filter.search.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(db("list_users"))?;

        rows.iter()
            .map(user_from_row)
            .collect::<Result<_, _>>()
            .map_err(db("list_users"))
    }

    #[instrument(skip(self, update))]
    async fn update_profile(
        &self,
        id: UserId,
        update: &UserProfileUpdate,
        now: DateTime<Utc>,
    ) -> DomainResult<User> {
        let mut tx = self.pool.begin().await.map_err(db("update_profile"))?;

        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM users WHERE id = $1 FOR UPDATE"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db("update_profile"))?
            .ok_or_else(not_found)?;
        let mut user = user_from_row(&row).map_err(db("update_profile"))?;
        update.apply(&mut user, now);

        sqlx::query(
            r#"
            UPDATE users
            SET name = $2, mobile = $3, employee_id = $4, address = $5,
                postal_code = $6, language_preference = $7, timezone = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&user.name)
        .bind(&user.mobile)
        .bind(&user.employee_id)
        .bind(&user.address)
        .bind(&user.postal_code)
        .bind(user.language_preference.as_str())
        .bind(&user.timezone)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db("update_profile"))?;

        tx.commit().await.map_err(db("update_profile"))?;
        Ok(user)
    }

    #[instrument(skip(self))]
    async fn set_active(&self, id: UserId, active: bool, now: DateTime<Utc>) -> DomainResult<User> {
        let row = sqlx::query(&format!(
            "UPDATE users SET is_active = $2, updated_at = $3 WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(active)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db("set_active"))?
        .ok_or_else(not_found)?;
        user_from_row(&row).map_err(db("set_active"))
    }

    #[instrument(skip(self, hash))]
    async fn set_password_hash(&self, id: UserId, hash: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(hash)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db("set_password_hash"))?;
        if result.rows_affected() == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    /// Single statement: the row lock taken by `UPDATE` serializes
    /// concurrent failures, and every `SET` expression sees the old row.
    #[instrument(skip(self))]
    async fn record_failed_login(
        &self,
        id: UserId,
        threshold: u32,
        lock_until: DateTime<Utc>,
    ) -> DomainResult<FailedLogin> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                locked_until = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN $3
                    ELSE locked_until
                END
            WHERE id = $1
            RETURNING failed_login_attempts, locked_until
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(threshold))
        .bind(lock_until)
        .fetch_optional(&self.pool)
        .await
        .map_err(db("record_failed_login"))?
        .ok_or_else(not_found)?;

        let decode = || -> Result<FailedLogin, sqlx::Error> {
            Ok(FailedLogin {
                attempts: to_u32(row.try_get("failed_login_attempts")?, "failed_login_attempts")?,
                locked_until: row.try_get("locked_until")?,
            })
        };
        decode().map_err(db("record_failed_login"))
    }

    #[instrument(skip(self))]
    async fn record_successful_login(&self, id: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0, locked_until = NULL, last_login = $2
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db("record_successful_login"))?;
        if result.rows_affected() == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn store_session(&self, id: UserId, session: StoredSession) -> DomainResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET session_access_token = $2, session_refresh_token = $3,
                session_created_at = $4, session_expires_at = $5,
                session_remember_me = $6
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.remember_me)
        .execute(&self.pool)
        .await
        .map_err(db("store_session"))?;
        if result.rows_affected() == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_session(&self, id: UserId) -> DomainResult<Option<StoredSession>> {
        let mut tx = self.pool.begin().await.map_err(db("clear_session"))?;

        let row = sqlx::query(
            r#"
            SELECT session_access_token, session_refresh_token, session_created_at,
                   session_expires_at, session_remember_me
            FROM users WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db("clear_session"))?
        .ok_or_else(not_found)?;
        let previous = session_from_row(&row).map_err(db("clear_session"))?;

        sqlx::query(
            r#"
            UPDATE users
            SET session_access_token = NULL, session_refresh_token = NULL,
                session_created_at = NULL, session_expires_at = NULL,
                session_remember_me = FALSE
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(db("clear_session"))?;

        tx.commit().await.map_err(db("clear_session"))?;
        Ok(previous)
    }

    /// Assignments go with the row through `ON DELETE CASCADE`.
    #[instrument(skip(self))]
    async fn delete(&self, id: UserId) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db("delete_user"))?;
        if result.rows_affected() == 0 {
            return Err(not_found());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postgres::test_pool;
    use std::sync::Arc;
    use uuid::Uuid;

    fn user(org: OrganizationId) -> User {
        let tag = Uuid::now_v7().simple().to_string();
        User::new(
            format!("u{}", &tag[20..]),
            format!("{tag}@ktl.com.bd"),
            "Test User",
            org,
            "$2b$04$hash",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn round_trips_and_enforces_unique_login_and_email() {
        let Some(pool) = test_pool().await else { return };
        let store = PostgresUserStore::new(pool);
        let org = OrganizationId::new();

        let u = store.insert(user(org)).await.unwrap();
        let loaded = store.get(u.id).await.unwrap().unwrap();
        assert_eq!(loaded.login_id, u.login_id);
        assert_eq!(loaded.organization_id, org);
        assert!(loaded.session.is_none());

        let mut same_login = user(org);
        same_login.login_id = u.login_id.clone();
        assert_eq!(
            store.insert(same_login).await.unwrap_err(),
            DomainError::conflict("A user with this login ID already exists")
        );

        let mut same_email = user(org);
        same_email.email = u.email.to_uppercase();
        assert_eq!(
            store.insert(same_email).await.unwrap_err(),
            DomainError::conflict("A user with this email already exists")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_are_all_counted() {
        let Some(pool) = test_pool().await else { return };
        let store = Arc::new(PostgresUserStore::new(pool));
        let u = store.insert(user(OrganizationId::new())).await.unwrap();
        let until = Utc::now() + chrono::Duration::minutes(30);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_failed_login(u.id, 5, until).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let loaded = store.get(u.id).await.unwrap().unwrap();
        assert_eq!(loaded.failed_login_attempts, 10);
        assert!(loaded.locked_until.is_some());

        store.record_successful_login(u.id, Utc::now()).await.unwrap();
        let loaded = store.get(u.id).await.unwrap().unwrap();
        assert_eq!(loaded.failed_login_attempts, 0);
        assert!(loaded.locked_until.is_none());
        assert!(loaded.last_login.is_some());
    }

    #[tokio::test]
    async fn session_is_cleared_once() {
        let Some(pool) = test_pool().await else { return };
        let store = PostgresUserStore::new(pool);
        let u = store.insert(user(OrganizationId::new())).await.unwrap();
        let now = Utc::now();
        store
            .store_session(
                u.id,
                StoredSession {
                    access_token: "a".into(),
                    refresh_token: "r".into(),
                    created_at: now,
                    expires_at: now + chrono::Duration::days(30),
                    remember_me: true,
                },
            )
            .await
            .unwrap();

        let first = store.clear_session(u.id).await.unwrap().unwrap();
        assert_eq!(first.refresh_token, "r");
        assert!(first.remember_me);
        assert!(store.clear_session(u.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_user_is_gone() {
        let Some(pool) = test_pool().await else { return };
        let store = PostgresUserStore::new(pool);
        let u = store.insert(user(OrganizationId::new())).await.unwrap();

        store.delete(u.id).await.unwrap();
        assert!(store.get(u.id).await.unwrap().is_none());
        assert_eq!(store.delete(u.id).await.unwrap_err(), not_found());
    }

    #[tokio::test]
    async fn unknown_user_updates_are_not_found() {
        let Some(pool) = test_pool().await else { return };
        let store = PostgresUserStore::new(pool);
        assert_eq!(
            store.set_active(UserId::new(), false, Utc::now()).await.unwrap_err(),
            not_found()
        );
        assert_eq!(
            store
                .record_failed_login(UserId::new(), 5, Utc::now())
                .await
                .unwrap_err(),
            not_found()
        );
    }
}
