//! Organization registry operations, with tenant scoping applied.

use std::sync::Arc;

use serde::Serialize;

use netdesk_auth::{ensure_same_organization, require_admin, require_super_admin, Principal};
use netdesk_core::{Clock, DomainError, DomainResult, OrganizationId};

use crate::commission::{self, CommissionRequest, CommissionSplit};
use crate::organization::{
    NewOrganization, Organization, OrganizationFilter, OrganizationStats, OrganizationUpdate,
};
use crate::settings::{BillingSettings, BillingSettingsUpdate, SyncSettings, SyncSettingsUpdate};
use crate::store::OrganizationStore;

/// An organization with whichever settings have been created so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationDetail {
    #[serde(flatten)]
    pub organization: Organization,
    pub billing_settings: Option<BillingSettings>,
    pub sync_settings: Option<SyncSettings>,
}

pub struct OrganizationService {
    store: Arc<dyn OrganizationStore>,
    clock: Arc<dyn Clock>,
}

fn not_found() -> DomainError {
    DomainError::not_found("Organization not found")
}

impl OrganizationService {
    pub fn new(store: Arc<dyn OrganizationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create(&self, actor: &Principal, new: NewOrganization) -> DomainResult<Organization> {
        require_super_admin(actor)?;
        self.register(new, Some(actor)).await
    }

    /// Register without an acting principal (bootstrap of a fresh install).
    pub async fn register(
        &self,
        new: NewOrganization,
        actor: Option<&Principal>,
    ) -> DomainResult<Organization> {
        new.validate()?;
        let org = self
            .store
            .insert(new.into_organization(actor.map(|a| a.user_id), self.clock.now()))
            .await?;
        tracing::info!(organization_id = %org.id, code = %org.code, "organization created");
        Ok(org)
    }

    pub async fn list(
        &self,
        actor: &Principal,
        mut filter: OrganizationFilter,
    ) -> DomainResult<Vec<Organization>> {
        filter.scope = actor.scope();
        self.store.list(&filter).await
    }

    pub async fn get(&self, actor: &Principal, id: OrganizationId) -> DomainResult<OrganizationDetail> {
        let organization = self.scoped(actor, id).await?;
        Ok(OrganizationDetail {
            billing_settings: self.store.billing_settings(id).await?,
            sync_settings: self.store.sync_settings(id).await?,
            organization,
        })
    }

    pub async fn update(
        &self,
        actor: &Principal,
        id: OrganizationId,
        update: OrganizationUpdate,
    ) -> DomainResult<Organization> {
        require_admin(actor)?;
        ensure_same_organization(actor, &id)?;
        let mut org = self.scoped(actor, id).await?;
        update.apply(&mut org, self.clock.now())?;
        self.store.update(&org).await
    }

    /// Soft delete.
    pub async fn deactivate(&self, actor: &Principal, id: OrganizationId) -> DomainResult<()> {
        require_admin(actor)?;
        ensure_same_organization(actor, &id)?;
        let mut org = self.scoped(actor, id).await?;
        org.is_active = false;
        org.updated_at = self.clock.now();
        self.store.update(&org).await?;
        tracing::info!(organization_id = %id, actor = %actor.user_id, "organization deactivated");
        Ok(())
    }

    pub async fn verify(&self, actor: &Principal, id: OrganizationId) -> DomainResult<Organization> {
        require_super_admin(actor)?;
        let mut org = self.store.get(id).await?.ok_or_else(not_found)?;
        org.is_verified = true;
        org.updated_at = self.clock.now();
        let org = self.store.update(&org).await?;
        tracing::info!(organization_id = %id, "organization verified");
        Ok(org)
    }

    pub async fn stats(&self, actor: &Principal) -> DomainResult<OrganizationStats> {
        let orgs = self
            .store
            .list(&OrganizationFilter::scoped(actor.scope()))
            .await?;
        Ok(OrganizationStats::tally(&orgs))
    }

    /// Unauthenticated existence check used by other services.
    pub async fn exists(&self, id: OrganizationId) -> DomainResult<bool> {
        self.store.exists(id).await
    }

    pub async fn billing_settings(
        &self,
        actor: &Principal,
        id: OrganizationId,
    ) -> DomainResult<BillingSettings> {
        self.scoped(actor, id).await?;
        self.store.billing_settings_or_default(id, self.clock.now()).await
    }

    pub async fn update_billing_settings(
        &self,
        actor: &Principal,
        id: OrganizationId,
        update: BillingSettingsUpdate,
    ) -> DomainResult<BillingSettings> {
        require_admin(actor)?;
        ensure_same_organization(actor, &id)?;
        let mut settings = self.billing_settings(actor, id).await?;
        update.apply(&mut settings, self.clock.now());
        self.store.save_billing_settings(&settings).await?;
        Ok(settings)
    }

    pub async fn sync_settings(&self, actor: &Principal, id: OrganizationId) -> DomainResult<SyncSettings> {
        self.scoped(actor, id).await?;
        self.store.sync_settings_or_default(id, self.clock.now()).await
    }

    pub async fn update_sync_settings(
        &self,
        actor: &Principal,
        id: OrganizationId,
        update: SyncSettingsUpdate,
    ) -> DomainResult<SyncSettings> {
        require_admin(actor)?;
        ensure_same_organization(actor, &id)?;
        let mut settings = self.sync_settings(actor, id).await?;
        update.apply(&mut settings, self.clock.now());
        self.store.save_sync_settings(&settings).await?;
        Ok(settings)
    }

    pub async fn commission_split(
        &self,
        actor: &Principal,
        id: OrganizationId,
        request: CommissionRequest,
    ) -> DomainResult<CommissionSplit> {
        let org = self.scoped(actor, id).await?;
        commission::split(&org.shares, &request)
    }

    async fn scoped(&self, actor: &Principal, id: OrganizationId) -> DomainResult<Organization> {
        self.store
            .get(id)
            .await?
            .filter(|org| actor.scope().admits(&org.id))
            .ok_or_else(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::memory::InMemoryOrganizationStore;
    use crate::organization::{OrgType, RevenueShares};
    use crate::commission::CustomerType;
    use netdesk_core::{ManualClock, UserId};

    fn service() -> OrganizationService {
        OrganizationService::new(
            Arc::new(InMemoryOrganizationStore::new()),
            Arc::new(ManualClock::default()),
        )
    }

    fn principal(org: OrganizationId, super_admin: bool, staff: bool) -> Principal {
        Principal {
            user_id: UserId::new(),
            organization_id: org,
            is_super_admin: super_admin,
            is_staff: staff,
            login_id: "p".into(),
            permissions: BTreeSet::new(),
        }
    }

    fn root() -> Principal {
        principal(OrganizationId::new(), true, true)
    }

    fn new_org(code: &str) -> NewOrganization {
        NewOrganization {
            name: format!("Org {code}"),
            code: code.into(),
            org_type: OrgType::Isp,
            email: format!("{}@isp.com.bd", code.to_lowercase()),
            phone: "01700000000".into(),
            mobile: None,
            website: Some("https://isp.com.bd".into()),
            address: "Road 2".into(),
            city: "Dhaka".into(),
            postal_code: "1212".into(),
            country: "Bangladesh".into(),
            trade_license: None,
            tin_number: None,
            registration_number: None,
            currency: "BDT".into(),
            revenue_sharing_enabled: true,
            shares: None,
        }
    }

    #[tokio::test]
    async fn only_super_admin_creates() {
        let svc = service();
        let staff = principal(OrganizationId::new(), false, true);
        assert!(matches!(
            svc.create(&staff, new_org("KTL")).await,
            Err(DomainError::Authorization(_))
        ));
        let org = svc.create(&root(), new_org("KTL")).await.unwrap();
        assert!(svc.exists(org.id).await.unwrap());
        assert!(!svc.exists(OrganizationId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_code_or_email_conflicts() {
        let svc = service();
        svc.create(&root(), new_org("KTL")).await.unwrap();

        let mut same_code = new_org("KTL");
        same_code.name = "Another".into();
        same_code.email = "other@isp.com.bd".into();
        assert_eq!(
            svc.create(&root(), same_code).await.unwrap_err(),
            DomainError::conflict("Organization with this code already exists.")
        );

        let mut same_email = new_org("DHK01");
        same_email.email = "KTL@isp.com.bd".into();
        assert_eq!(
            svc.create(&root(), same_email).await.unwrap_err(),
            DomainError::conflict("Organization with this email already exists.")
        );
    }

    #[tokio::test]
    async fn tenant_sees_only_itself() {
        let svc = service();
        let mine = svc.create(&root(), new_org("MINE")).await.unwrap();
        let theirs = svc.create(&root(), new_org("THEIRS")).await.unwrap();
        let member = principal(mine.id, false, false);

        let listed = svc
            .list(&member, OrganizationFilter::scoped(netdesk_auth::OrgScope::All))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine.id);

        assert_eq!(svc.get(&member, theirs.id).await.unwrap_err(), not_found());
        assert_eq!(svc.stats(&member).await.unwrap().total_organizations, 1);
        assert_eq!(svc.stats(&root()).await.unwrap().total_organizations, 2);
    }

    #[tokio::test]
    async fn settings_are_created_once_on_first_read() {
        let svc = service();
        let org = svc.create(&root(), new_org("KTL")).await.unwrap();
        let admin = principal(org.id, false, true);

        let detail = svc.get(&admin, org.id).await.unwrap();
        assert!(detail.billing_settings.is_none());
        assert!(detail.sync_settings.is_none());

        let first = svc.billing_settings(&admin, org.id).await.unwrap();
        let updated = svc
            .update_billing_settings(
                &admin,
                org.id,
                BillingSettingsUpdate {
                    max_inactive_days: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(svc.billing_settings(&admin, org.id).await.unwrap().max_inactive_days, 10);

        svc.sync_settings(&admin, org.id).await.unwrap();
        let detail = svc.get(&admin, org.id).await.unwrap();
        assert!(detail.billing_settings.is_some());
        assert!(detail.sync_settings.is_some());
    }

    #[tokio::test]
    async fn soft_delete_and_verify() {
        let svc = service();
        let org = svc.create(&root(), new_org("KTL")).await.unwrap();
        let admin = principal(org.id, false, true);

        assert!(matches!(
            svc.verify(&admin, org.id).await,
            Err(DomainError::Authorization(_))
        ));
        assert!(svc.verify(&root(), org.id).await.unwrap().is_verified);
        assert_eq!(svc.verify(&root(), OrganizationId::new()).await.unwrap_err(), not_found());

        svc.deactivate(&admin, org.id).await.unwrap();
        let detail = svc.get(&admin, org.id).await.unwrap();
        assert!(!detail.organization.is_active);
        assert!(svc.exists(org.id).await.unwrap());
    }

    #[tokio::test]
    async fn commission_uses_organization_shares() {
        let svc = service();
        let mut new = new_org("KTL");
        new.shares = Some(RevenueShares {
            reseller: 4_000,
            ..RevenueShares::default()
        });
        let org = svc.create(&root(), new).await.unwrap();

        let s = svc
            .commission_split(
                &root(),
                org.id,
                CommissionRequest {
                    amount: 10_000,
                    customer_type: CustomerType::Reseller,
                    has_sub_reseller: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(s.reseller, Some(4_000));
        assert_eq!(s.organization, 6_000);
    }
}
