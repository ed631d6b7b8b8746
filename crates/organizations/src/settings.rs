//! Per-organization billing and sync settings.
//!
//! Each organization has at most one of each, created with defaults the first
//! time it is read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use netdesk_core::{DomainError, DomainResult, OrganizationId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingSettings {
    pub organization_id: OrganizationId,
    pub max_manual_grace_days: u32,
    pub disable_expiry: bool,
    pub default_grace_days: u32,
    pub jump_billing: bool,
    /// Grace period for hourly plans.
    pub default_grace_hours: u32,
    pub max_inactive_days: u32,
    /// Days before a permanently disabled secret is removed from the router.
    /// 0 deletes immediately.
    pub delete_permanent_disable_secret_days: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillingSettings {
    pub fn defaults(organization_id: OrganizationId, now: DateTime<Utc>) -> Self {
        Self {
            organization_id,
            max_manual_grace_days: 9,
            disable_expiry: false,
            default_grace_days: 1,
            jump_billing: true,
            default_grace_hours: 14,
            max_inactive_days: 3,
            delete_permanent_disable_secret_days: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BillingSettingsUpdate {
    pub max_manual_grace_days: Option<u32>,
    pub disable_expiry: Option<bool>,
    pub default_grace_days: Option<u32>,
    pub jump_billing: Option<bool>,
    pub default_grace_hours: Option<u32>,
    pub max_inactive_days: Option<u32>,
    pub delete_permanent_disable_secret_days: Option<u32>,
}

impl BillingSettingsUpdate {
    pub fn apply(self, settings: &mut BillingSettings, now: DateTime<Utc>) {
        if let Some(v) = self.max_manual_grace_days {
            settings.max_manual_grace_days = v;
        }
        if let Some(v) = self.disable_expiry {
            settings.disable_expiry = v;
        }
        if let Some(v) = self.default_grace_days {
            settings.default_grace_days = v;
        }
        if let Some(v) = self.jump_billing {
            settings.jump_billing = v;
        }
        if let Some(v) = self.default_grace_hours {
            settings.default_grace_hours = v;
        }
        if let Some(v) = self.max_inactive_days {
            settings.max_inactive_days = v;
        }
        if let Some(v) = self.delete_permanent_disable_secret_days {
            settings.delete_permanent_disable_secret_days = v;
        }
        settings.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "in_progress" => Ok(SyncStatus::InProgress),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(DomainError::validation(format!("Unknown sync status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncFrequency {
    Hourly,
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl SyncFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncFrequency::Hourly => "hourly",
            SyncFrequency::Daily => "daily",
            SyncFrequency::Weekly => "weekly",
            SyncFrequency::Monthly => "monthly",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "hourly" => Ok(SyncFrequency::Hourly),
            "daily" => Ok(SyncFrequency::Daily),
            "weekly" => Ok(SyncFrequency::Weekly),
            "monthly" => Ok(SyncFrequency::Monthly),
            other => Err(DomainError::validation(format!("Unknown sync frequency: {other}"))),
        }
    }
}

/// Router (MikroTik) synchronisation toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSettings {
    pub organization_id: OrganizationId,
    pub sync_area_to_mikrotik: bool,
    pub sync_address_to_mikrotik: bool,
    pub sync_customer_mobile_to_mikrotik: bool,
    pub last_sync_status: SyncStatus,
    pub sync_frequency: SyncFrequency,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncSettings {
    pub fn defaults(organization_id: OrganizationId, now: DateTime<Utc>) -> Self {
        Self {
            organization_id,
            sync_area_to_mikrotik: false,
            sync_address_to_mikrotik: false,
            sync_customer_mobile_to_mikrotik: false,
            last_sync_status: SyncStatus::Pending,
            sync_frequency: SyncFrequency::Daily,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncSettingsUpdate {
    pub sync_area_to_mikrotik: Option<bool>,
    pub sync_address_to_mikrotik: Option<bool>,
    pub sync_customer_mobile_to_mikrotik: Option<bool>,
    pub last_sync_status: Option<SyncStatus>,
    pub sync_frequency: Option<SyncFrequency>,
}

impl SyncSettingsUpdate {
    pub fn apply(self, settings: &mut SyncSettings, now: DateTime<Utc>) {
        if let Some(v) = self.sync_area_to_mikrotik {
            settings.sync_area_to_mikrotik = v;
        }
        if let Some(v) = self.sync_address_to_mikrotik {
            settings.sync_address_to_mikrotik = v;
        }
        if let Some(v) = self.sync_customer_mobile_to_mikrotik {
            settings.sync_customer_mobile_to_mikrotik = v;
        }
        if let Some(v) = self.last_sync_status {
            settings.last_sync_status = v;
        }
        if let Some(v) = self.sync_frequency {
            settings.sync_frequency = v;
        }
        settings.updated_at = now;
    }
}
