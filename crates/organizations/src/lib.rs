//! `netdesk-organizations`: the tenant registry.

pub mod commission;
pub mod memory;
pub mod organization;
pub mod service;
pub mod settings;
pub mod store;

pub use commission::{CommissionRequest, CommissionSplit, CustomerType};
pub use memory::InMemoryOrganizationStore;
pub use organization::{
    NewOrganization, OrgType, Organization, OrganizationFilter, OrganizationStats,
    OrganizationUpdate, RevenueShares,
};
pub use service::{OrganizationDetail, OrganizationService};
pub use settings::{
    BillingSettings, BillingSettingsUpdate, SyncFrequency, SyncSettings, SyncSettingsUpdate,
    SyncStatus,
};
pub use store::OrganizationStore;
