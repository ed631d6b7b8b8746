//! `OrganizationStore` over `organizations`, `billing_settings` and
//! `sync_settings`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use netdesk_core::{DomainError, DomainResult, OrganizationId, UserId};
use netdesk_organizations::{
    BillingSettings, OrgType, Organization, OrganizationFilter, OrganizationStore, RevenueShares,
    SyncFrequency, SyncSettings, SyncStatus,
};

use super::{bad_value, db, to_u32};

const ORG_COLUMNS: &str = r#"
    id, name, code, org_type, email, phone, mobile, website, address, city,
    postal_code, country, trade_license, tin_number, registration_number,
    currency, revenue_sharing_enabled, reseller_share, sub_reseller_share,
    ktl_share_with_sub, reseller_share_with_sub, is_active, is_verified,
    created_by, created_at, updated_at
"#;

const BILLING_COLUMNS: &str = r#"
    organization_id, max_manual_grace_days, disable_expiry, default_grace_days,
    jump_billing, default_grace_hours, max_inactive_days,
    delete_permanent_disable_secret_days, created_at, updated_at
"#;

const SYNC_COLUMNS: &str = r#"
    organization_id, sync_area_to_mikrotik, sync_address_to_mikrotik,
    sync_customer_mobile_to_mikrotik, last_sync_status, sync_frequency,
    created_at, updated_at
"#;

fn not_found() -> DomainError {
    DomainError::not_found("Organization not found")
}

fn organization_from_row(row: &PgRow) -> Result<Organization, sqlx::Error> {
    let org_type: String = row.try_get("org_type")?;
    let created_by: Option<uuid::Uuid> = row.try_get("created_by")?;
    Ok(Organization {
        id: OrganizationId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        org_type: OrgType::parse(&org_type).map_err(|e| bad_value("org_type", e))?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        mobile: row.try_get("mobile")?,
        website: row.try_get("website")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        postal_code: row.try_get("postal_code")?,
        country: row.try_get("country")?,
        trade_license: row.try_get("trade_license")?,
        tin_number: row.try_get("tin_number")?,
        registration_number: row.try_get("registration_number")?,
        currency: row.try_get("currency")?,
        revenue_sharing_enabled: row.try_get("revenue_sharing_enabled")?,
        shares: RevenueShares {
            reseller: to_u32(row.try_get("reseller_share")?, "reseller_share")?,
            sub_reseller: to_u32(row.try_get("sub_reseller_share")?, "sub_reseller_share")?,
            ktl_with_sub: to_u32(row.try_get("ktl_share_with_sub")?, "ktl_share_with_sub")?,
            reseller_with_sub: to_u32(row.try_get("reseller_share_with_sub")?, "reseller_share_with_sub")?,
        },
        is_active: row.try_get("is_active")?,
        is_verified: row.try_get("is_verified")?,
        created_by: created_by.map(UserId::from_uuid),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn billing_from_row(row: &PgRow) -> Result<BillingSettings, sqlx::Error> {
    Ok(BillingSettings {
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        max_manual_grace_days: to_u32(row.try_get("max_manual_grace_days")?, "max_manual_grace_days")?,
        disable_expiry: row.try_get("disable_expiry")?,
        default_grace_days: to_u32(row.try_get("default_grace_days")?, "default_grace_days")?,
        jump_billing: row.try_get("jump_billing")?,
        default_grace_hours: to_u32(row.try_get("default_grace_hours")?, "default_grace_hours")?,
        max_inactive_days: to_u32(row.try_get("max_inactive_days")?, "max_inactive_days")?,
        delete_permanent_disable_secret_days: to_u32(
            row.try_get("delete_permanent_disable_secret_days")?,
            "delete_permanent_disable_secret_days",
        )?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn sync_from_row(row: &PgRow) -> Result<SyncSettings, sqlx::Error> {
    let status: String = row.try_get("last_sync_status")?;
    let frequency: String = row.try_get("sync_frequency")?;
    Ok(SyncSettings {
        organization_id: OrganizationId::from_uuid(row.try_get("organization_id")?),
        sync_area_to_mikrotik: row.try_get("sync_area_to_mikrotik")?,
        sync_address_to_mikrotik: row.try_get("sync_address_to_mikrotik")?,
        sync_customer_mobile_to_mikrotik: row.try_get("sync_customer_mobile_to_mikrotik")?,
        last_sync_status: SyncStatus::parse(&status).map_err(|e| bad_value("last_sync_status", e))?,
        sync_frequency: SyncFrequency::parse(&frequency).map_err(|e| bad_value("sync_frequency", e))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct PostgresOrganizationStore {
    pool: PgPool,
}

impl PostgresOrganizationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write billing settings for an existing organization; `false` when the
    /// organization does not exist. `overwrite` selects upsert vs insert-once.
    async fn write_billing(
        &self,
        settings: &BillingSettings,
        overwrite: bool,
        operation: &'static str,
    ) -> DomainResult<bool> {
        let on_conflict = if overwrite {
            r#"
            DO UPDATE SET
                max_manual_grace_days = EXCLUDED.max_manual_grace_days,
                disable_expiry = EXCLUDED.disable_expiry,
                default_grace_days = EXCLUDED.default_grace_days,
                jump_billing = EXCLUDED.jump_billing,
                default_grace_hours = EXCLUDED.default_grace_hours,
                max_inactive_days = EXCLUDED.max_inactive_days,
                delete_permanent_disable_secret_days = EXCLUDED.delete_permanent_disable_secret_days,
                updated_at = EXCLUDED.updated_at
            "#
        } else {
            "DO NOTHING"
        };
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO billing_settings ({BILLING_COLUMNS})
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
            WHERE EXISTS (SELECT 1 FROM organizations WHERE id = $1)
            ON CONFLICT (organization_id) {on_conflict}
            "#
        ))
        .bind(settings.organization_id.as_uuid())
        .bind(i64::from(settings.max_manual_grace_days))
        .bind(settings.disable_expiry)
        .bind(i64::from(settings.default_grace_days))
        .bind(settings.jump_billing)
        .bind(i64::from(settings.default_grace_hours))
        .bind(i64::from(settings.max_inactive_days))
        .bind(i64::from(settings.delete_permanent_disable_secret_days))
        .bind(settings.created_at)
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db(operation))?;
        Ok(result.rows_affected() > 0)
    }

    async fn write_sync(
        &self,
        settings: &SyncSettings,
        overwrite: bool,
        operation: &'static str,
    ) -> DomainResult<bool> {
        let on_conflict = if overwrite {
            r#"
            DO UPDATE SET
                sync_area_to_mikrotik = EXCLUDED.sync_area_to_mikrotik,
                sync_address_to_mikrotik = EXCLUDED.sync_address_to_mikrotik,
                sync_customer_mobile_to_mikrotik = EXCLUDED.sync_customer_mobile_to_mikrotik,
                last_sync_status = EXCLUDED.last_sync_status,
                sync_frequency = EXCLUDED.sync_frequency,
                updated_at = EXCLUDED.updated_at
            "#
        } else {
            "DO NOTHING"
        };
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO sync_settings ({SYNC_COLUMNS})
            SELECT $1, $2, $3, $4, $5, $6, $7, $8
            WHERE EXISTS (SELECT 1 FROM organizations WHERE id = $1)
            ON CONFLICT (organization_id) {on_conflict}
            "#
        ))
        .bind(settings.organization_id.as_uuid())
        .bind(settings.sync_area_to_mikrotik)
        .bind(settings.sync_address_to_mikrotik)
        .bind(settings.sync_customer_mobile_to_mikrotik)
        .bind(settings.last_sync_status.as_str())
        .bind(settings.sync_frequency.as_str())
        .bind(settings.created_at)
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db(operation))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OrganizationStore for PostgresOrganizationStore {
    #[instrument(skip(self, org), fields(organization_id = %org.id, code = %org.code))]
    async fn insert(&self, org: Organization) -> DomainResult<Organization> {
        sqlx::query(&format!(
            r#"
            INSERT INTO organizations ({ORG_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26)
            "#
        ))
        .bind(org.id.as_uuid())
        .bind(&org.name)
        .bind(&org.code)
        .bind(org.org_type.as_str())
        .bind(&org.email)
        .bind(&org.phone)
        .bind(&org.mobile)
        .bind(&org.website)
        .bind(&org.address)
        .bind(&org.city)
        .bind(&org.postal_code)
        .bind(&org.country)
        .bind(&org.trade_license)
        .bind(&org.tin_number)
        .bind(&org.registration_number)
        .bind(&org.currency)
        .bind(org.revenue_sharing_enabled)
        .bind(i64::from(org.shares.reseller))
        .bind(i64::from(org.shares.sub_reseller))
        .bind(i64::from(org.shares.ktl_with_sub))
        .bind(i64::from(org.shares.reseller_with_sub))
        .bind(org.is_active)
        .bind(org.is_verified)
        .bind(org.created_by.map(|u| *u.as_uuid()))
        .bind(org.created_at)
        .bind(org.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db("insert_organization"))?;
        Ok(org)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: OrganizationId) -> DomainResult<Option<Organization>> {
        let row = sqlx::query(&format!("SELECT {ORG_COLUMNS} FROM organizations WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db("get_organization"))?;
        row.as_ref()
            .map(organization_from_row)
            .transpose()
            .map_err(db("get_organization"))
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &OrganizationFilter) -> DomainResult<Vec<Organization>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORG_COLUMNS} FROM organizations
            WHERE ($1::uuid IS NULL OR id = $1)
              AND ($2::boolean IS NULL OR is_active = $2)
              AND ($3::boolean IS NULL OR is_verified = $3)
              AND ($4::text IS NULL OR org_type = $4)
              AND ($5::text IS NULL
                   OR strpos(lower(name), lower($5)) > 0
                   OR strpos(lower(code), lower($5)) > 0
                   OR strpos(lower(email), lower($5)) > 0
                   OR strpos(lower(city), lower($5)) > 0)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(filter.scope.organization().map(|o| *o.as_uuid()))
        .bind(filter.is_active)
        .bind(filter.is_verified)
        .bind(filter.org_type.map(|t| t.as_str()))
        .bind(filter.search.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(db("list_organizations"))?;

        rows.iter()
            .map(organization_from_row)
            .collect::<Result<_, _>>()
            .map_err(db("list_organizations"))
    }

    #[instrument(skip(self, org), fields(organization_id = %org.id))]
    async fn update(&self, org: &Organization) -> DomainResult<Organization> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE organizations
            SET name = $2, code = $3, org_type = $4, email = $5, phone = $6,
                mobile = $7, website = $8, address = $9, city = $10,
                postal_code = $11, country = $12, trade_license = $13,
                tin_number = $14, registration_number = $15, currency = $16,
                revenue_sharing_enabled = $17, reseller_share = $18,
                sub_reseller_share = $19, ktl_share_with_sub = $20,
                reseller_share_with_sub = $21, is_active = $22,
                is_verified = $23, updated_at = $24
            WHERE id = $1
            RETURNING {ORG_COLUMNS}
            "#
        ))
        .bind(org.id.as_uuid())
        .bind(&org.name)
        .bind(&org.code)
        .bind(org.org_type.as_str())
        .bind(&org.email)
        .bind(&org.phone)
        .bind(&org.mobile)
        .bind(&org.website)
        .bind(&org.address)
        .bind(&org.city)
        .bind(&org.postal_code)
        .bind(&org.country)
        .bind(&org.trade_license)
        .bind(&org.tin_number)
        .bind(&org.registration_number)
        .bind(&org.currency)
        .bind(org.revenue_sharing_enabled)
        .bind(i64::from(org.shares.reseller))
        .bind(i64::from(org.shares.sub_reseller))
        .bind(i64::from(org.shares.ktl_with_sub))
        .bind(i64::from(org.shares.reseller_with_sub))
        .bind(org.is_active)
        .bind(org.is_verified)
        .bind(org.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(db("update_organization"))?
        .ok_or_else(not_found)?;
        organization_from_row(&row).map_err(db("update_organization"))
    }

    #[instrument(skip(self))]
    async fn exists(&self, id: OrganizationId) -> DomainResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM organizations WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(db("organization_exists"))
    }

    #[instrument(skip(self))]
    async fn billing_settings(&self, id: OrganizationId) -> DomainResult<Option<BillingSettings>> {
        let row = sqlx::query(&format!(
            "SELECT {BILLING_COLUMNS} FROM billing_settings WHERE organization_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db("billing_settings"))?;
        row.as_ref()
            .map(billing_from_row)
            .transpose()
            .map_err(db("billing_settings"))
    }

    /// Insert-once (`ON CONFLICT DO NOTHING`) then read back, so concurrent
    /// first reads agree on a single row.
    #[instrument(skip(self))]
    async fn billing_settings_or_default(
        &self,
        id: OrganizationId,
        now: DateTime<Utc>,
    ) -> DomainResult<BillingSettings> {
        self.write_billing(&BillingSettings::defaults(id, now), false, "billing_settings_or_default")
            .await?;
        self.billing_settings(id).await?.ok_or_else(not_found)
    }

    #[instrument(skip(self, settings), fields(organization_id = %settings.organization_id))]
    async fn save_billing_settings(&self, settings: &BillingSettings) -> DomainResult<()> {
        if !self.write_billing(settings, true, "save_billing_settings").await? {
            return Err(not_found());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn sync_settings(&self, id: OrganizationId) -> DomainResult<Option<SyncSettings>> {
        let row = sqlx::query(&format!(
            "SELECT {SYNC_COLUMNS} FROM sync_settings WHERE organization_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db("sync_settings"))?;
        row.as_ref()
            .map(sync_from_row)
            .transpose()
            .map_err(db("sync_settings"))
    }

    #[instrument(skip(self))]
    async fn sync_settings_or_default(
        &self,
        id: OrganizationId,
        now: DateTime<Utc>,
    ) -> DomainResult<SyncSettings> {
        self.write_sync(&SyncSettings::defaults(id, now), false, "sync_settings_or_default")
            .await?;
        self.sync_settings(id).await?.ok_or_else(not_found)
    }

    #[instrument(skip(self, settings), fields(organization_id = %settings.organization_id))]
    async fn save_sync_settings(&self, settings: &SyncSettings) -> DomainResult<()> {
        if !self.write_sync(settings, true, "save_sync_settings").await? {
            return Err(not_found());
        }
        Ok(())
    }
}
