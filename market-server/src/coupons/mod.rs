//! Coupon registry
//!
//! Coupons are issued by vendors (scoped to themselves) or by platform
//! admins. Usage is consumed only by the commit pipeline; this module covers
//! issuing, lookup and activation.

use crate::orders::{CheckoutError, CheckoutResult};
use crate::storage::MarketStorage;
use rust_decimal::Decimal;
use shared::models::{Actor, Coupon, CouponCreate, CouponScope, OfferKind};
use shared::util::normalize_code;

/// 参数校验
fn validate_create(payload: &CouponCreate) -> CheckoutResult<()> {
    let invalid = |msg: &str| Err(CheckoutError::Validation(msg.to_string()));

    if normalize_code(&payload.code).is_empty() {
        return invalid("code must not be empty");
    }
    if let (Some(from), Some(until)) = (payload.valid_from, payload.valid_until)
        && until <= from
    {
        return invalid("valid_until must be later than valid_from");
    }
    if payload.usage_limit == Some(0) {
        return invalid("usage_limit must be at least 1");
    }
    if payload.min_amount < Decimal::ZERO {
        return invalid("min_amount must not be negative");
    }
    if let Some(max) = payload.max_amount
        && max < payload.min_amount
    {
        return invalid("max_amount must not be below min_amount");
    }
    if let CouponScope::Categories(ids) = &payload.scope
        && ids.is_empty()
    {
        return invalid("category scope needs at least one category");
    }

    let percent_ok = |p: &Decimal| *p > Decimal::ZERO && *p <= Decimal::ONE_HUNDRED;
    match &payload.offer {
        OfferKind::Percentage { percent } if !percent_ok(percent) => {
            invalid("percent must be in (0, 100]")
        }
        OfferKind::Prepaid {
            percent,
            min_discount,
            max_discount,
        } => {
            if !percent_ok(percent) {
                return invalid("percent must be in (0, 100]");
            }
            if let (Some(lo), Some(hi)) = (min_discount, max_discount)
                && lo > hi
            {
                return invalid("min_discount must not exceed max_discount");
            }
            Ok(())
        }
        OfferKind::Fixed { amount } | OfferKind::DailyOffer { amount, .. }
            if *amount <= Decimal::ZERO =>
        {
            invalid("amount must be positive")
        }
        OfferKind::DailyOffer {
            start_date: Some(start),
            end_date: Some(end),
            ..
        } if end < start => invalid("end_date must not be before start_date"),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct CouponRegistry {
    storage: MarketStorage,
}

impl CouponRegistry {
    pub fn new(storage: MarketStorage) -> Self {
        Self { storage }
    }

    /// Issue a coupon; vendors issue for themselves, admins for the platform
    pub fn create(&self, actor: &Actor, payload: CouponCreate, now: i64) -> CheckoutResult<Coupon> {
        let vendor_id = match actor {
            Actor::Vendor(id) => Some(id.clone()),
            Actor::Admin(_) | Actor::System => None,
            other => {
                return Err(CheckoutError::PermissionDenied(format!(
                    "{} may not issue coupons",
                    other
                )));
            }
        };
        validate_create(&payload)?;

        let coupon = Coupon {
            id: uuid::Uuid::new_v4().to_string(),
            code: normalize_code(&payload.code),
            offer: payload.offer,
            scope: payload.scope,
            min_amount: payload.min_amount,
            max_amount: payload.max_amount,
            valid_from: payload.valid_from,
            valid_until: payload.valid_until,
            usage_limit: payload.usage_limit,
            used_count: 0,
            is_active: payload.is_active.unwrap_or(true),
            vendor_id,
            created_by: actor.id().map(String::from),
            created_at: now,
        };

        if !self.storage.insert_coupon(&coupon)? {
            return Err(CheckoutError::CouponCodeExists(coupon.code));
        }
        tracing::info!(
            coupon_id = %coupon.id,
            code = %coupon.code,
            kind = coupon.offer.name(),
            actor = %actor,
            "Coupon issued"
        );
        Ok(coupon)
    }

    pub fn get(&self, coupon_id: &str) -> CheckoutResult<Coupon> {
        self.storage
            .get_coupon(coupon_id)?
            .ok_or_else(|| CheckoutError::CouponNotFound(coupon_id.to_string()))
    }

    pub fn find_by_code(&self, code: &str) -> CheckoutResult<Coupon> {
        let normalized = normalize_code(code);
        self.storage
            .find_coupon_by_code(&normalized)?
            .ok_or(CheckoutError::CouponNotFound(normalized))
    }

    /// Activate or deactivate; vendors only touch their own coupons
    pub fn set_active(&self, actor: &Actor, coupon_id: &str, active: bool) -> CheckoutResult<Coupon> {
        let coupon = self
            .storage
            .get_coupon(coupon_id)?
            .ok_or_else(|| CheckoutError::CouponNotFound(coupon_id.to_string()))?;

        let allowed = actor.is_privileged()
            || matches!((actor, &coupon.vendor_id), (Actor::Vendor(id), Some(owner)) if id == owner);
        if !allowed {
            return Err(CheckoutError::PermissionDenied(format!(
                "{} may not modify coupon {}",
                actor, coupon.code
            )));
        }

        self.storage
            .set_coupon_active(coupon_id, active)?
            .ok_or_else(|| CheckoutError::CouponNotFound(coupon_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(code: &str) -> CouponCreate {
        CouponCreate {
            code: code.into(),
            offer: OfferKind::Percentage {
                percent: Decimal::from(10),
            },
            scope: CouponScope::AllCategories,
            min_amount: Decimal::from(150),
            max_amount: None,
            valid_from: None,
            valid_until: None,
            usage_limit: Some(5),
            is_active: None,
        }
    }

    fn registry() -> CouponRegistry {
        CouponRegistry::new(MarketStorage::open_in_memory().unwrap())
    }

    #[test]
    fn test_vendor_issues_normalized_code() {
        let reg = registry();
        let coupon = reg
            .create(&Actor::Vendor("v-1".into()), payload("  save10 "), 7)
            .unwrap();
        assert_eq!(coupon.code, "SAVE10");
        assert_eq!(coupon.vendor_id.as_deref(), Some("v-1"));
        assert!(coupon.is_active);
        assert_eq!(reg.find_by_code("Save10").unwrap().id, coupon.id);
        assert_eq!(reg.get(&coupon.id).unwrap().code, "SAVE10");

        assert!(matches!(
            reg.create(&Actor::Admin("a-1".into()), payload("SAVE10"), 8),
            Err(CheckoutError::CouponCodeExists(code)) if code == "SAVE10"
        ));
    }

    #[test]
    fn test_users_cannot_issue() {
        assert!(matches!(
            registry().create(&Actor::User("u-1".into()), payload("X"), 0),
            Err(CheckoutError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_validation() {
        let reg = registry();
        let admin = Actor::Admin("a-1".into());

        let mut window = payload("WINDOW");
        window.valid_from = Some(100);
        window.valid_until = Some(100);
        assert!(matches!(
            reg.create(&admin, window, 0),
            Err(CheckoutError::Validation(_))
        ));

        let mut pct = payload("PCT");
        pct.offer = OfferKind::Percentage {
            percent: Decimal::from(120),
        };
        assert!(matches!(
            reg.create(&admin, pct, 0),
            Err(CheckoutError::Validation(_))
        ));

        let mut scope = payload("SCOPE");
        scope.scope = CouponScope::Categories(vec![]);
        assert!(matches!(
            reg.create(&admin, scope, 0),
            Err(CheckoutError::Validation(_))
        ));

        assert!(matches!(
            reg.create(&admin, payload("   "), 0),
            Err(CheckoutError::Validation(_))
        ));
    }

    #[test]
    fn test_set_active_ownership() {
        let reg = registry();
        let coupon = reg
            .create(&Actor::Vendor("v-1".into()), payload("OWN"), 0)
            .unwrap();

        assert!(matches!(
            reg.set_active(&Actor::Vendor("v-2".into()), &coupon.id, false),
            Err(CheckoutError::PermissionDenied(_))
        ));
        let off = reg
            .set_active(&Actor::Vendor("v-1".into()), &coupon.id, false)
            .unwrap();
        assert!(!off.is_active);
    }
}
