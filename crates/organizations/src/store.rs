use async_trait::async_trait;
use chrono::{DateTime, Utc};

use netdesk_core::{DomainResult, OrganizationId};

use crate::organization::{Organization, OrganizationFilter};
use crate::settings::{BillingSettings, SyncSettings};

/// Persistence port for organizations and their settings.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Conflict when the name, code or email (case-insensitively) is taken.
    async fn insert(&self, org: Organization) -> DomainResult<Organization>;

    async fn get(&self, id: OrganizationId) -> DomainResult<Option<Organization>>;

    /// Newest first.
    async fn list(&self, filter: &OrganizationFilter) -> DomainResult<Vec<Organization>>;

    /// Same uniqueness rules as `insert`, excluding the row itself.
    async fn update(&self, org: &Organization) -> DomainResult<Organization>;

    async fn exists(&self, id: OrganizationId) -> DomainResult<bool>;

    async fn billing_settings(&self, id: OrganizationId) -> DomainResult<Option<BillingSettings>>;

    /// Existing settings, or defaults inserted at most once under concurrency.
    async fn billing_settings_or_default(
        &self,
        id: OrganizationId,
        now: DateTime<Utc>,
    ) -> DomainResult<BillingSettings>;

    async fn save_billing_settings(&self, settings: &BillingSettings) -> DomainResult<()>;

    async fn sync_settings(&self, id: OrganizationId) -> DomainResult<Option<SyncSettings>>;

    async fn sync_settings_or_default(
        &self,
        id: OrganizationId,
        now: DateTime<Utc>,
    ) -> DomainResult<SyncSettings>;

    async fn save_sync_settings(&self, settings: &SyncSettings) -> DomainResult<()>;
}
