//! Coupon Model
//!
//! A coupon is immutable once issued except for `used_count` and `is_active`.
//! The kind-specific parameters live inside [`OfferKind`] so every consumer
//! matches on it exhaustively.

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Offer kind with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OfferKind {
    /// `amount × percent / 100`
    Percentage { percent: Decimal },
    /// `min(amount, order amount)`
    Fixed { amount: Decimal },
    /// Percentage clamped into `[min_discount, max_discount]`
    Prepaid {
        percent: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_discount: Option<Decimal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_discount: Option<Decimal>,
    },
    /// Fixed amount inside a calendar range and a wall-clock window
    DailyOffer {
        amount: Decimal,
        /// Empty = any product
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        product_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_date: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_date: Option<NaiveDate>,
        /// 开始时间 (HH:MM:SS)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_time: Option<NaiveTime>,
        /// 结束时间 (HH:MM:SS)，早于开始时间表示跨夜
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_time: Option<NaiveTime>,
    },
    /// Waives handling, no subtotal discount
    FreeShipping,
    /// Buy-one-get-one, fulfilled outside pricing
    Bogo,
}

impl OfferKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Percentage { .. } => "percentage",
            Self::Fixed { .. } => "fixed",
            Self::Prepaid { .. } => "prepaid",
            Self::DailyOffer { .. } => "daily_offer",
            Self::FreeShipping => "free_shipping",
            Self::Bogo => "bogo",
        }
    }
}

/// Category applicability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "category_ids", rename_all = "snake_case")]
pub enum CouponScope {
    #[default]
    AllCategories,
    Categories(Vec<String>),
}

/// Coupon entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    /// Normalized (trimmed, upper-case) code
    pub code: String,
    pub offer: OfferKind,
    #[serde(default)]
    pub scope: CouponScope,
    pub min_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<Decimal>,
    /// Valid from (Unix millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<i64>,
    /// Valid until (Unix millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub used_count: u32,
    pub is_active: bool,
    /// Issuing vendor, `None` for platform coupons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: i64,
}

impl Coupon {
    /// Whether another use would stay within `usage_limit`
    pub fn has_remaining_uses(&self) -> bool {
        self.usage_limit.is_none_or(|limit| self.used_count < limit)
    }

    pub fn to_ref(&self) -> CouponRef {
        CouponRef {
            coupon_id: self.id.clone(),
            code: self.code.clone(),
        }
    }
}

/// Create coupon payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponCreate {
    pub code: String,
    pub offer: OfferKind,
    #[serde(default)]
    pub scope: CouponScope,
    #[serde(default)]
    pub min_amount: Decimal,
    pub max_amount: Option<Decimal>,
    pub valid_from: Option<i64>,
    pub valid_until: Option<i64>,
    pub usage_limit: Option<u32>,
    pub is_active: Option<bool>,
}

/// Coupon reference held by a cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRef {
    pub coupon_id: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_kind_tagged_shape() {
        let json = r#"{"kind":"daily_offer","amount":"30","product_ids":["p-1"],"start_time":"22:00:00","end_time":"02:00:00"}"#;
        let kind: OfferKind = serde_json::from_str(json).unwrap();
        match kind {
            OfferKind::DailyOffer {
                amount,
                product_ids,
                start_time,
                end_time,
                start_date,
                ..
            } => {
                assert_eq!(amount, Decimal::from(30));
                assert_eq!(product_ids, vec!["p-1".to_string()]);
                assert_eq!(start_time, NaiveTime::from_hms_opt(22, 0, 0));
                assert_eq!(end_time, NaiveTime::from_hms_opt(2, 0, 0));
                assert!(start_date.is_none());
            }
            other => panic!("unexpected kind {:?}", other),
        }

        let free: OfferKind = serde_json::from_str(r#"{"kind":"free_shipping"}"#).unwrap();
        assert_eq!(free, OfferKind::FreeShipping);
    }

    #[test]
    fn test_scope_shape() {
        let scope: CouponScope =
            serde_json::from_str(r#"{"type":"categories","category_ids":["c-1","c-2"]}"#).unwrap();
        assert_eq!(
            scope,
            CouponScope::Categories(vec!["c-1".into(), "c-2".into()])
        );
        let all: CouponScope = serde_json::from_str(r#"{"type":"all_categories"}"#).unwrap();
        assert_eq!(all, CouponScope::AllCategories);
    }
}
