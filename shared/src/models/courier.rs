//! Courier and assignment offer models

use super::ApprovalStatus;
use serde::{Deserialize, Serialize};

/// Courier profile as seen by the broadcaster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierProfile {
    pub id: String,
    pub name: String,
    /// Vendors this courier delivers for
    #[serde(default)]
    pub vendor_ids: Vec<String>,
    pub is_active: bool,
    #[serde(default)]
    pub approval: ApprovalStatus,
}

impl CourierProfile {
    /// Active, approved and affiliated with one of `vendor_ids`
    pub fn is_eligible_for(&self, vendor_ids: &[String]) -> bool {
        self.is_active
            && self.approval == ApprovalStatus::Approved
            && self.vendor_ids.iter().any(|v| vendor_ids.contains(v))
    }
}

/// Offer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Expired,
}

/// One offer per (order, courier) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentOffer {
    pub order_id: String,
    pub order_number: String,
    pub courier_id: String,
    pub offered_at: i64,
    pub status: OfferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<i64>,
}

impl AssignmentOffer {
    pub fn pending(
        order_id: impl Into<String>,
        order_number: impl Into<String>,
        courier_id: impl Into<String>,
        offered_at: i64,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            order_number: order_number.into(),
            courier_id: courier_id.into(),
            offered_at,
            status: OfferStatus::Pending,
            responded_at: None,
        }
    }
}
