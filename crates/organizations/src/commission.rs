//! Revenue split between the organization and its resellers.
//!
//! Amounts are integer minor units (poisha). Shares are basis points and each
//! computed share rounds toward zero; the rounding remainder stays with the
//! party that takes "the rest" so the parts always sum to the input.

use serde::{Deserialize, Serialize};

use netdesk_core::{DomainError, DomainResult};

use crate::organization::{RevenueShares, FULL_SHARE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    KtlDirect,
    Reseller,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommissionSplit {
    pub organization: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reseller: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_reseller: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommissionRequest {
    pub amount: i64,
    pub customer_type: CustomerType,
    #[serde(default)]
    pub has_sub_reseller: bool,
}

fn portion(amount: i64, share_bps: u32) -> i64 {
    // i128 keeps amount * 10_000 from overflowing.
    (i128::from(amount) * i128::from(share_bps) / i128::from(FULL_SHARE)) as i64
}

pub fn split(shares: &RevenueShares, request: &CommissionRequest) -> DomainResult<CommissionSplit> {
    if request.amount < 0 {
        return Err(DomainError::validation("Amount cannot be negative"));
    }
    let amount = request.amount;

    let split = match (&request.customer_type, request.has_sub_reseller) {
        (CustomerType::Reseller, true) => {
            let organization = portion(amount, shares.ktl_with_sub);
            let reseller = portion(amount, shares.reseller_with_sub);
            CommissionSplit {
                organization,
                reseller: Some(reseller),
                sub_reseller: Some(amount - organization - reseller),
            }
        }
        (CustomerType::Reseller, false) => {
            let reseller = portion(amount, shares.reseller);
            CommissionSplit {
                organization: amount - reseller,
                reseller: Some(reseller),
                sub_reseller: None,
            }
        }
        (CustomerType::KtlDirect | CustomerType::Other, _) => CommissionSplit {
            organization: amount,
            reseller: None,
            sub_reseller: None,
        },
    };
    Ok(split)
}
