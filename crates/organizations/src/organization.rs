//! Organizations (tenants).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use netdesk_auth::OrgScope;
use netdesk_core::{DomainError, DomainResult, OrganizationId, UserId};

pub const MAX_CODE_LENGTH: usize = 20;
pub const MAX_NAME_LENGTH: usize = 255;

/// One hundred percent, in basis points.
pub const FULL_SHARE: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrgType {
    #[default]
    Isp,
    Corporate,
    Other,
}

impl OrgType {
    pub const ALL: [OrgType; 3] = [OrgType::Isp, OrgType::Corporate, OrgType::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrgType::Isp => "isp",
            OrgType::Corporate => "corporate",
            OrgType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "isp" => Ok(OrgType::Isp),
            "corporate" => Ok(OrgType::Corporate),
            "other" => Ok(OrgType::Other),
            other => Err(DomainError::validation(format!(
                "Unknown organization type: {other}"
            ))),
        }
    }
}

/// Default revenue-share percentages, in basis points (5000 = 50.00%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueShares {
    pub reseller: u32,
    pub sub_reseller: u32,
    pub ktl_with_sub: u32,
    pub reseller_with_sub: u32,
}

impl Default for RevenueShares {
    fn default() -> Self {
        Self {
            reseller: 5_000,
            sub_reseller: 4_500,
            ktl_with_sub: 5_000,
            reseller_with_sub: 500,
        }
    }
}

impl RevenueShares {
    pub fn validate(&self) -> DomainResult<()> {
        for (field, value) in [
            ("reseller", self.reseller),
            ("sub_reseller", self.sub_reseller),
            ("ktl_with_sub", self.ktl_with_sub),
            ("reseller_with_sub", self.reseller_with_sub),
        ] {
            if value > FULL_SHARE {
                return Err(DomainError::validation(format!(
                    "Share '{field}' cannot exceed 100%"
                )));
            }
        }
        if self.ktl_with_sub + self.reseller_with_sub > FULL_SHARE {
            return Err(DomainError::validation(
                "Organization and reseller shares with a sub-reseller cannot exceed 100% together",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub code: String,
    pub org_type: OrgType,

    pub email: String,
    pub phone: String,
    pub mobile: Option<String>,
    pub website: Option<String>,

    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,

    pub trade_license: Option<String>,
    pub tin_number: Option<String>,
    pub registration_number: Option<String>,

    pub currency: String,
    pub revenue_sharing_enabled: bool,
    pub shares: RevenueShares,

    pub is_active: bool,
    pub is_verified: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_country() -> String {
    "Bangladesh".to_string()
}

fn default_currency() -> String {
    "BDT".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub org_type: OrgType,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub trade_license: Option<String>,
    #[serde(default)]
    pub tin_number: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_true")]
    pub revenue_sharing_enabled: bool,
    #[serde(default)]
    pub shares: Option<RevenueShares>,
}

/// `^[A-Z0-9_-]+$`, at most 20 characters.
pub fn validate_code(code: &str) -> DomainResult<()> {
    if code.is_empty() {
        return Err(DomainError::validation("Organization code is required"));
    }
    if code.chars().count() > MAX_CODE_LENGTH {
        return Err(DomainError::validation(format!(
            "Organization code must be at most {MAX_CODE_LENGTH} characters"
        )));
    }
    let allowed = |c: char| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '_' | '-');
    if !code.chars().all(allowed) {
        return Err(DomainError::validation(
            "Organization code must contain only uppercase letters, numbers, underscores, and hyphens",
        ));
    }
    Ok(())
}

fn validate_website(website: Option<&str>) -> DomainResult<()> {
    match website {
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
            Err(DomainError::validation("Enter a valid URL."))
        }
        _ => Ok(()),
    }
}

fn require(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        Err(DomainError::validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

impl NewOrganization {
    pub fn validate(&self) -> DomainResult<()> {
        require("Name", &self.name)?;
        if self.name.chars().count() > MAX_NAME_LENGTH {
            return Err(DomainError::validation(format!(
                "Name must be at most {MAX_NAME_LENGTH} characters"
            )));
        }
        validate_code(&self.code)?;
        netdesk_auth::user::validate_email(&self.email)?;
        require("Phone", &self.phone)?;
        require("Address", &self.address)?;
        require("City", &self.city)?;
        require("Postal code", &self.postal_code)?;
        validate_website(self.website.as_deref())?;
        if let Some(shares) = &self.shares {
            shares.validate()?;
        }
        Ok(())
    }

    pub fn into_organization(self, created_by: Option<UserId>, now: DateTime<Utc>) -> Organization {
        Organization {
            id: OrganizationId::new(),
            name: self.name.trim().to_string(),
            code: self.code,
            org_type: self.org_type,
            email: self.email,
            phone: self.phone,
            mobile: self.mobile,
            website: self.website,
            address: self.address,
            city: self.city,
            postal_code: self.postal_code,
            country: self.country,
            trade_license: self.trade_license,
            tin_number: self.tin_number,
            registration_number: self.registration_number,
            currency: self.currency,
            revenue_sharing_enabled: self.revenue_sharing_enabled,
            shares: self.shares.unwrap_or_default(),
            is_active: true,
            is_verified: false,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. The code is immutable; verification has its own action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OrganizationUpdate {
    pub name: Option<String>,
    pub org_type: Option<OrgType>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub trade_license: Option<String>,
    pub tin_number: Option<String>,
    pub registration_number: Option<String>,
    pub currency: Option<String>,
    pub revenue_sharing_enabled: Option<bool>,
    pub shares: Option<RevenueShares>,
    pub is_active: Option<bool>,
}

impl OrganizationUpdate {
    pub fn apply(self, org: &mut Organization, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = self.name {
            require("Name", &name)?;
            org.name = name.trim().to_string();
        }
        if let Some(email) = self.email {
            netdesk_auth::user::validate_email(&email)?;
            org.email = email;
        }
        if let Some(website) = self.website {
            validate_website(Some(&website))?;
            org.website = Some(website);
        }
        if let Some(shares) = self.shares {
            shares.validate()?;
            org.shares = shares;
        }
        if let Some(v) = self.org_type {
            org.org_type = v;
        }
        if let Some(v) = self.phone {
            org.phone = v;
        }
        if let Some(v) = self.mobile {
            org.mobile = Some(v);
        }
        if let Some(v) = self.address {
            org.address = v;
        }
        if let Some(v) = self.city {
            org.city = v;
        }
        if let Some(v) = self.postal_code {
            org.postal_code = v;
        }
        if let Some(v) = self.country {
            org.country = v;
        }
        if let Some(v) = self.trade_license {
            org.trade_license = Some(v);
        }
        if let Some(v) = self.tin_number {
            org.tin_number = Some(v);
        }
        if let Some(v) = self.registration_number {
            org.registration_number = Some(v);
        }
        if let Some(v) = self.currency {
            org.currency = v;
        }
        if let Some(v) = self.revenue_sharing_enabled {
            org.revenue_sharing_enabled = v;
        }
        if let Some(v) = self.is_active {
            org.is_active = v;
        }
        org.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationFilter {
    pub scope: OrgScope,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub org_type: Option<OrgType>,
    pub search: Option<String>,
}

impl OrganizationFilter {
    pub fn scoped(scope: OrgScope) -> Self {
        Self {
            scope,
            is_active: None,
            is_verified: None,
            org_type: None,
            search: None,
        }
    }

    pub fn matches(&self, org: &Organization) -> bool {
        if !self.scope.admits(&org.id) {
            return false;
        }
        if matches!(self.is_active, Some(v) if v != org.is_active) {
            return false;
        }
        if matches!(self.is_verified, Some(v) if v != org.is_verified) {
            return false;
        }
        if matches!(self.org_type, Some(t) if t != org.org_type) {
            return false;
        }
        if let Some(term) = self.search.as_deref().map(str::to_lowercase) {
            return [&org.name, &org.code, &org.email, &org.city]
                .iter()
                .any(|f| f.to_lowercase().contains(&term));
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationStats {
    pub total_organizations: u64,
    pub active_organizations: u64,
    pub verified_organizations: u64,
    pub organizations_by_type: BTreeMap<&'static str, u64>,
}

impl OrganizationStats {
    pub fn tally<'a>(orgs: impl IntoIterator<Item = &'a Organization>) -> Self {
        let mut stats = Self {
            total_organizations: 0,
            active_organizations: 0,
            verified_organizations: 0,
            organizations_by_type: OrgType::ALL.iter().map(|t| (t.as_str(), 0)).collect(),
        };
        for org in orgs {
            stats.total_organizations += 1;
            stats.active_organizations += u64::from(org.is_active);
            stats.verified_organizations += u64::from(org.is_verified);
            *stats
                .organizations_by_type
                .entry(org.org_type.as_str())
                .or_default() += 1;
        }
        stats
    }
}
