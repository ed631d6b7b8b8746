use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use netdesk_core::{DomainError, DomainResult, OrganizationId};

use crate::organization::{Organization, OrganizationFilter};
use crate::settings::{BillingSettings, SyncSettings};
use crate::store::OrganizationStore;

#[derive(Debug, Default)]
struct State {
    orgs: HashMap<OrganizationId, Organization>,
    billing: HashMap<OrganizationId, BillingSettings>,
    sync: HashMap<OrganizationId, SyncSettings>,
}

impl State {
    fn check_unique(&self, org: &Organization) -> DomainResult<()> {
        let code = org.code.to_lowercase();
        let email = org.email.to_lowercase();
        for other in self.orgs.values().filter(|o| o.id != org.id) {
            if other.name == org.name {
                return Err(DomainError::conflict("Organization with this name already exists."));
            }
            if other.code.to_lowercase() == code {
                return Err(DomainError::conflict("Organization with this code already exists."));
            }
            if other.email.to_lowercase() == email {
                return Err(DomainError::conflict("Organization with this email already exists."));
            }
        }
        Ok(())
    }

    fn ensure_org(&self, id: OrganizationId) -> DomainResult<()> {
        if self.orgs.contains_key(&id) {
            Ok(())
        } else {
            Err(DomainError::not_found("Organization not found"))
        }
    }
}

/// Organization registry held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryOrganizationStore {
    inner: RwLock<State>,
}

impl InMemoryOrganizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> DomainResult<RwLockReadGuard<'_, State>> {
        self.inner
            .read()
            .map_err(|_| DomainError::internal("organization store lock poisoned"))
    }

    fn write(&self) -> DomainResult<RwLockWriteGuard<'_, State>> {
        self.inner
            .write()
            .map_err(|_| DomainError::internal("organization store lock poisoned"))
    }
}

#[async_trait]
impl OrganizationStore for InMemoryOrganizationStore {
    async fn insert(&self, org: Organization) -> DomainResult<Organization> {
        let mut state = self.write()?;
        state.check_unique(&org)?;
        state.orgs.insert(org.id, org.clone());
        Ok(org)
    }

    async fn get(&self, id: OrganizationId) -> DomainResult<Option<Organization>> {
        Ok(self.read()?.orgs.get(&id).cloned())
    }

    async fn list(&self, filter: &OrganizationFilter) -> DomainResult<Vec<Organization>> {
        let mut out: Vec<Organization> = self
            .read()?
            .orgs
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn update(&self, org: &Organization) -> DomainResult<Organization> {
        let mut state = self.write()?;
        state.ensure_org(org.id)?;
        state.check_unique(org)?;
        state.orgs.insert(org.id, org.clone());
        Ok(org.clone())
    }

    async fn exists(&self, id: OrganizationId) -> DomainResult<bool> {
        Ok(self.read()?.orgs.contains_key(&id))
    }

    async fn billing_settings(&self, id: OrganizationId) -> DomainResult<Option<BillingSettings>> {
        Ok(self.read()?.billing.get(&id).cloned())
    }

    async fn billing_settings_or_default(
        &self,
        id: OrganizationId,
        now: DateTime<Utc>,
    ) -> DomainResult<BillingSettings> {
        let mut state = self.write()?;
        state.ensure_org(id)?;
        Ok(state
            .billing
            .entry(id)
            .or_insert_with(|| BillingSettings::defaults(id, now))
            .clone())
    }

    async fn save_billing_settings(&self, settings: &BillingSettings) -> DomainResult<()> {
        let mut state = self.write()?;
        state.ensure_org(settings.organization_id)?;
        state.billing.insert(settings.organization_id, settings.clone());
        Ok(())
    }

    async fn sync_settings(&self, id: OrganizationId) -> DomainResult<Option<SyncSettings>> {
        Ok(self.read()?.sync.get(&id).cloned())
    }

    async fn sync_settings_or_default(
        &self,
        id: OrganizationId,
        now: DateTime<Utc>,
    ) -> DomainResult<SyncSettings> {
        let mut state = self.write()?;
        state.ensure_org(id)?;
        Ok(state
            .sync
            .entry(id)
            .or_insert_with(|| SyncSettings::defaults(id, now))
            .clone())
    }

    async fn save_sync_settings(&self, settings: &SyncSettings) -> DomainResult<()> {
        let mut state = self.write()?;
        state.ensure_org(settings.organization_id)?;
        state.sync.insert(settings.organization_id, settings.clone());
        Ok(())
    }
}
