//! Discount Engine
//!
//! Evaluates a coupon against an order amount and the candidate product,
//! category and vendor sets. Pure: no I/O, no usage accounting. Rules run in
//! a fixed order and the first failure wins.
//!
//! A vendor-issued coupon only sees that vendor's share of the subtotal:
//! amount bounds and the discount itself are computed on it.

use super::money::{percent_of, round_money};
use crate::utils::time::{date_in_range, local_datetime, offer_day, time_in_window};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::{Coupon, CouponScope, OfferKind};
use shared::order::CouponEffect;

/// Why a coupon does not apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    Inactive,
    NotYetValid,
    Expired,
    UsageExhausted,
    VendorMismatch,
    OutsideDateRange,
    OutsideTimeWindow,
    NoEligibleProduct,
    BelowMinimum { min_amount: Decimal },
    AboveMaximum { max_amount: Decimal },
    CategoryMismatch,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => write!(f, "coupon is not active"),
            Self::NotYetValid => write!(f, "coupon is not valid yet"),
            Self::Expired => write!(f, "coupon has expired"),
            Self::UsageExhausted => write!(f, "coupon usage limit reached"),
            Self::VendorMismatch => write!(f, "no cart item from the issuing vendor"),
            Self::OutsideDateRange => write!(f, "offer is not running today"),
            Self::OutsideTimeWindow => write!(f, "offer is not running at this time"),
            Self::NoEligibleProduct => write!(f, "no eligible product in cart"),
            Self::BelowMinimum { min_amount } => {
                write!(f, "order amount below minimum {}", min_amount)
            }
            Self::AboveMaximum { max_amount } => {
                write!(f, "order amount above maximum {}", max_amount)
            }
            Self::CategoryMismatch => write!(f, "no cart item in an eligible category"),
        }
    }
}

/// Evaluation result
#[derive(Debug, Clone, PartialEq)]
pub enum DiscountOutcome {
    Valid {
        /// Subtotal discount, `0 <= discount <= order amount`
        discount: Decimal,
        effect: Option<CouponEffect>,
    },
    Rejected(RejectReason),
}

impl DiscountOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub fn discount_amount(&self) -> Decimal {
        match self {
            Self::Valid { discount, .. } => *discount,
            Self::Rejected(_) => Decimal::ZERO,
        }
    }

    pub fn effect(&self) -> Option<CouponEffect> {
        match self {
            Self::Valid { effect, .. } => *effect,
            Self::Rejected(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            Self::Valid { .. } => None,
            Self::Rejected(reason) => Some(reason),
        }
    }
}

/// Inputs besides the coupon
#[derive(Debug, Clone, Copy)]
pub struct DiscountContext<'a> {
    pub order_amount: Decimal,
    pub product_ids: &'a [String],
    pub category_ids: &'a [String],
    /// Subtotal per vendor among the candidate lines
    pub vendor_amounts: &'a [(String, Decimal)],
    /// Unix millis
    pub now: i64,
    /// Business timezone for daily-offer windows
    pub timezone: Tz,
}

/// Evaluate `coupon` in `ctx`
pub fn evaluate(coupon: &Coupon, ctx: &DiscountContext<'_>) -> DiscountOutcome {
    match check_rules(coupon, ctx) {
        Ok(eligible) => {
            let (discount, effect) = compute(&coupon.offer, eligible);
            DiscountOutcome::Valid { discount, effect }
        }
        Err(reason) => DiscountOutcome::Rejected(reason),
    }
}

/// Returns the amount the coupon applies to
fn check_rules(coupon: &Coupon, ctx: &DiscountContext<'_>) -> Result<Decimal, RejectReason> {
    // 1. active / validity window / usage
    if !coupon.is_active {
        return Err(RejectReason::Inactive);
    }
    if coupon.valid_from.is_some_and(|from| ctx.now < from) {
        return Err(RejectReason::NotYetValid);
    }
    if coupon.valid_until.is_some_and(|until| ctx.now > until) {
        return Err(RejectReason::Expired);
    }
    if !coupon.has_remaining_uses() {
        return Err(RejectReason::UsageExhausted);
    }

    // 2. vendor scope
    let eligible = match coupon.vendor_id.as_deref() {
        None => ctx.order_amount,
        Some(vendor_id) => ctx
            .vendor_amounts
            .iter()
            .find(|(v, _)| v == vendor_id)
            .map(|(_, amount)| (*amount).min(ctx.order_amount))
            .ok_or(RejectReason::VendorMismatch)?,
    };

    // 3. daily offer windows and product allow-list
    if let OfferKind::DailyOffer {
        product_ids,
        start_date,
        end_date,
        start_time,
        end_time,
        ..
    } = &coupon.offer
    {
        let local = local_datetime(ctx.now, ctx.timezone);
        let day = offer_day(local, *start_time, *end_time);
        if !date_in_range(day, *start_date, *end_date) {
            return Err(RejectReason::OutsideDateRange);
        }
        if !time_in_window(local.time(), *start_time, *end_time) {
            return Err(RejectReason::OutsideTimeWindow);
        }
        if !product_ids.is_empty() && !ctx.product_ids.iter().any(|p| product_ids.contains(p)) {
            return Err(RejectReason::NoEligibleProduct);
        }
    }

    // 4. amount bounds
    if eligible < coupon.min_amount {
        return Err(RejectReason::BelowMinimum {
            min_amount: coupon.min_amount,
        });
    }
    if let Some(max_amount) = coupon.max_amount
        && eligible > max_amount
    {
        return Err(RejectReason::AboveMaximum { max_amount });
    }

    // 5. category scope
    if let CouponScope::Categories(categories) = &coupon.scope
        && !ctx.category_ids.iter().any(|c| categories.contains(c))
    {
        return Err(RejectReason::CategoryMismatch);
    }

    Ok(eligible)
}

fn compute(offer: &OfferKind, amount: Decimal) -> (Decimal, Option<CouponEffect>) {
    let discount = match offer {
        OfferKind::Percentage { percent } => percent_of(amount, *percent),
        OfferKind::Fixed { amount: fixed } => (*fixed).min(amount),
        OfferKind::Prepaid {
            percent,
            min_discount,
            max_discount,
        } => {
            let mut d = percent_of(amount, *percent);
            if let Some(min) = min_discount {
                d = d.max(*min);
            }
            if let Some(max) = max_discount {
                d = d.min(*max);
            }
            d
        }
        OfferKind::DailyOffer { amount: offer, .. } => (*offer).min(amount),
        OfferKind::FreeShipping => return (Decimal::ZERO, Some(CouponEffect::FreeShipping)),
        OfferKind::Bogo => return (Decimal::ZERO, Some(CouponEffect::Bogo)),
    };
    // 折扣不超过订单金额，不为负
    (round_money(discount.clamp(Decimal::ZERO, amount.max(Decimal::ZERO))), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    fn coupon(offer: OfferKind) -> Coupon {
        Coupon {
            id: "c-1".into(),
            code: "CODE".into(),
            offer,
            scope: CouponScope::AllCategories,
            min_amount: Decimal::ZERO,
            max_amount: None,
            valid_from: None,
            valid_until: None,
            usage_limit: None,
            used_count: 0,
            is_active: true,
            vendor_id: None,
            created_by: None,
            created_at: 0,
        }
    }

    fn ctx<'a>(amount: i64, products: &'a [String], categories: &'a [String]) -> DiscountContext<'a> {
        DiscountContext {
            order_amount: Decimal::from(amount),
            product_ids: products,
            category_ids: categories,
            vendor_amounts: &[],
            now: 0,
            timezone: Tz::UTC,
        }
    }

    fn utc_millis(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        chrono::Utc
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_percentage_with_minimum() {
        let mut c = coupon(OfferKind::Percentage {
            percent: Decimal::from(10),
        });
        c.min_amount = Decimal::from(150);

        let out = evaluate(&c, &ctx(200, &[], &[]));
        assert_eq!(out.discount_amount(), Decimal::from(20));

        let out = evaluate(&c, &ctx(100, &[], &[]));
        assert_eq!(
            out,
            DiscountOutcome::Rejected(RejectReason::BelowMinimum {
                min_amount: Decimal::from(150)
            })
        );
    }

    #[test]
    fn test_fixed_capped_at_amount() {
        let c = coupon(OfferKind::Fixed {
            amount: Decimal::from(80),
        });
        assert_eq!(evaluate(&c, &ctx(50, &[], &[])).discount_amount(), Decimal::from(50));
        assert_eq!(evaluate(&c, &ctx(500, &[], &[])).discount_amount(), Decimal::from(80));
    }

    #[test]
    fn test_prepaid_clamped() {
        let c = coupon(OfferKind::Prepaid {
            percent: Decimal::from(10),
            min_discount: Some(Decimal::from(15)),
            max_discount: Some(Decimal::from(40)),
        });
        // 10% of 100 = 10 -> raised to 15
        assert_eq!(evaluate(&c, &ctx(100, &[], &[])).discount_amount(), Decimal::from(15));
        // 10% of 1000 = 100 -> capped at 40
        assert_eq!(evaluate(&c, &ctx(1000, &[], &[])).discount_amount(), Decimal::from(40));
        // 10% of 250 = 25 -> unchanged
        assert_eq!(evaluate(&c, &ctx(250, &[], &[])).discount_amount(), Decimal::from(25));
    }

    #[test]
    fn test_validity_checked_first() {
        let mut c = coupon(OfferKind::Fixed {
            amount: Decimal::from(10),
        });
        c.min_amount = Decimal::from(1000);
        c.is_active = false;
        assert_eq!(
            evaluate(&c, &ctx(1, &[], &[])),
            DiscountOutcome::Rejected(RejectReason::Inactive)
        );

        c.is_active = true;
        c.usage_limit = Some(3);
        c.used_count = 3;
        assert_eq!(
            evaluate(&c, &ctx(1, &[], &[])),
            DiscountOutcome::Rejected(RejectReason::UsageExhausted)
        );

        c.usage_limit = None;
        c.valid_until = Some(-1);
        assert_eq!(
            evaluate(&c, &ctx(1, &[], &[])),
            DiscountOutcome::Rejected(RejectReason::Expired)
        );
    }

    #[test]
    fn test_max_amount_and_category_scope() {
        let mut c = coupon(OfferKind::Percentage {
            percent: Decimal::from(5),
        });
        c.max_amount = Some(Decimal::from(300));
        assert!(matches!(
            evaluate(&c, &ctx(301, &[], &[])),
            DiscountOutcome::Rejected(RejectReason::AboveMaximum { .. })
        ));

        c.max_amount = None;
        c.scope = CouponScope::Categories(vec!["cat-food".into()]);
        let cats = vec!["cat-toys".to_string()];
        assert_eq!(
            evaluate(&c, &ctx(100, &[], &cats)),
            DiscountOutcome::Rejected(RejectReason::CategoryMismatch)
        );
        let cats = vec!["cat-toys".to_string(), "cat-food".to_string()];
        assert!(evaluate(&c, &ctx(100, &[], &cats)).is_valid());
    }

    #[test]
    fn test_daily_offer_windows() {
        let c = coupon(OfferKind::DailyOffer {
            amount: Decimal::from(30),
            product_ids: vec!["p-1".into()],
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 31),
            start_time: NaiveTime::from_hms_opt(22, 0, 0),
            end_time: NaiveTime::from_hms_opt(2, 0, 0),
        });
        let products = vec!["p-1".to_string()];

        let mut context = ctx(100, &products, &[]);
        context.now = utc_millis(2026, 3, 10, 23, 30);
        assert_eq!(evaluate(&c, &context).discount_amount(), Decimal::from(30));

        // overnight window wraps past midnight
        context.now = utc_millis(2026, 3, 11, 1, 0);
        assert!(evaluate(&c, &context).is_valid());

        // the last night runs into the morning after end_date
        context.now = utc_millis(2026, 4, 1, 1, 0);
        assert!(evaluate(&c, &context).is_valid());

        // early hours of start_date belong to the night before it
        context.now = utc_millis(2026, 3, 1, 1, 0);
        assert_eq!(
            evaluate(&c, &context),
            DiscountOutcome::Rejected(RejectReason::OutsideDateRange)
        );

        context.now = utc_millis(2026, 3, 10, 12, 0);
        assert_eq!(
            evaluate(&c, &context),
            DiscountOutcome::Rejected(RejectReason::OutsideTimeWindow)
        );

        context.now = utc_millis(2026, 4, 1, 23, 0);
        assert_eq!(
            evaluate(&c, &context),
            DiscountOutcome::Rejected(RejectReason::OutsideDateRange)
        );

        let other = vec!["p-2".to_string()];
        let mut context = ctx(100, &other, &[]);
        context.now = utc_millis(2026, 3, 10, 23, 30);
        assert_eq!(
            evaluate(&c, &context),
            DiscountOutcome::Rejected(RejectReason::NoEligibleProduct)
        );
    }

    #[test]
    fn test_vendor_coupon_limited_to_own_goods() {
        let mut c = coupon(OfferKind::Percentage {
            percent: Decimal::from(10),
        });
        c.vendor_id = Some("v-2".into());

        let only_v1 = vec![("v-1".to_string(), Decimal::from(200))];
        let mut context = ctx(200, &[], &[]);
        context.vendor_amounts = &only_v1;
        assert_eq!(
            evaluate(&c, &context),
            DiscountOutcome::Rejected(RejectReason::VendorMismatch)
        );

        // 10% of v-2's 50, not of the 250 subtotal
        let mixed = vec![
            ("v-1".to_string(), Decimal::from(200)),
            ("v-2".to_string(), Decimal::from(50)),
        ];
        let mut context = ctx(250, &[], &[]);
        context.vendor_amounts = &mixed;
        assert_eq!(evaluate(&c, &context).discount_amount(), Decimal::from(5));

        // minimum is checked against the vendor share
        c.min_amount = Decimal::from(100);
        assert!(matches!(
            evaluate(&c, &context),
            DiscountOutcome::Rejected(RejectReason::BelowMinimum { .. })
        ));

        // platform coupons still see the whole subtotal
        c.vendor_id = None;
        assert_eq!(evaluate(&c, &context).discount_amount(), Decimal::from(25));
    }

    #[test]
    fn test_daily_offer_uses_business_timezone() {
        let c = coupon(OfferKind::DailyOffer {
            amount: Decimal::from(5),
            product_ids: vec![],
            start_date: None,
            end_date: None,
            start_time: NaiveTime::from_hms_opt(9, 0, 0),
            end_time: NaiveTime::from_hms_opt(11, 0, 0),
        });
        // 08:00 UTC = 10:00 in Madrid (CET, winter)
        let mut context = ctx(100, &[], &[]);
        context.now = utc_millis(2026, 1, 15, 8, 0);
        assert!(!evaluate(&c, &context).is_valid());
        context.timezone = chrono_tz::Europe::Madrid;
        assert!(evaluate(&c, &context).is_valid());
    }

    #[test]
    fn test_non_monetary_kinds() {
        let out = evaluate(&coupon(OfferKind::FreeShipping), &ctx(100, &[], &[]));
        assert_eq!(out.discount_amount(), Decimal::ZERO);
        assert_eq!(out.effect(), Some(CouponEffect::FreeShipping));

        let out = evaluate(&coupon(OfferKind::Bogo), &ctx(100, &[], &[]));
        assert_eq!(out.discount_amount(), Decimal::ZERO);
        assert_eq!(out.effect(), Some(CouponEffect::Bogo));
    }
}
