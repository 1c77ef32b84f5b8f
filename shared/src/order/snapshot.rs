//! Order snapshot - the frozen record produced at checkout
//!
//! Prices, cashback and display data are copied from the reconciled cart at
//! commit time and never recomputed. After creation only the lifecycle fields
//! (status, payment status, courier, timestamps, notes) change.

use super::types::{OrderStatus, PaymentInfo, ShippingAddress, StatusChange};
use crate::models::{Actor, DisplaySnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Frozen order line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    pub product_id: String,
    pub vendor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_key: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    /// 返现 (per line, already multiplied by quantity)
    pub cashback_amount: Decimal,
    pub display: DisplaySnapshot,
}

/// Frozen price breakdown
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PricingBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub handling: Decimal,
    pub total: Decimal,
    pub total_cashback: Decimal,
}

/// Non-monetary effect of a coupon
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CouponEffect {
    /// Handling fee waived
    FreeShipping,
    /// Buy-one-get-one, fulfilled by the vendor
    Bogo,
}

/// Coupon applied to an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CouponApplication {
    pub coupon_id: String,
    pub code: String,
    pub discount_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<CouponEffect>,
}

/// Order record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Internal id
    pub id: String,
    /// Human-readable unique number
    pub order_number: String,
    pub user_id: String,
    /// Vendors represented in the lines (deduplicated, in line order)
    pub vendor_ids: Vec<String>,
    pub lines: Vec<OrderLine>,
    pub pricing: PricingBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<CouponApplication>,
    pub shipping_address: ShippingAddress,
    pub payment: PaymentInfo,
    pub status: OrderStatus,
    /// Assigned courier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Set by the first transition into ready that broadcast offers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<Actor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl Order {
    pub fn has_vendor(&self, vendor_id: &str) -> bool {
        self.vendor_ids.iter().any(|v| v == vendor_id)
    }

    /// Distinct vendor ids from lines, first occurrence order
    pub fn collect_vendor_ids(lines: &[OrderLine]) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for line in lines {
            if !ids.contains(&line.vendor_id) {
                ids.push(line.vendor_id.clone());
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(vendor: &str) -> OrderLine {
        OrderLine {
            product_id: format!("p-{}", vendor),
            vendor_id: vendor.into(),
            variant_key: None,
            quantity: 1,
            unit_price: Decimal::ONE,
            total_price: Decimal::ONE,
            cashback_amount: Decimal::ZERO,
            display: DisplaySnapshot::default(),
        }
    }

    #[test]
    fn test_collect_vendor_ids_dedups_in_order() {
        let lines = vec![line("v-2"), line("v-1"), line("v-2")];
        assert_eq!(
            Order::collect_vendor_ids(&lines),
            vec!["v-2".to_string(), "v-1".to_string()]
        );
    }
}
