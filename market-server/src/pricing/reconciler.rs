//! Pricing Reconciler
//!
//! Re-fetches authoritative product state for every cart line, drops lines
//! that can no longer be sold, prices the survivors and re-runs the discount
//! engine against the fresh subtotal. Unavailability is reported through
//! [`Reconciliation::removed`], never as an error; only an unreachable
//! catalog fails the call.

use super::discount::{DiscountContext, DiscountOutcome, RejectReason, evaluate};
use super::money::{line_total, percent_of, round_money};
use crate::catalog::{CatalogError, CatalogResult, CatalogStore, ProductState};
use crate::core::PricingConfig;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::{ApprovalStatus, CartLine, Coupon, DisplaySnapshot};
use shared::order::{CouponApplication, CouponEffect, OrderLine, PricingBreakdown};
use std::sync::Arc;

/// Why a line was dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RemovalReason {
    ProductNotFound,
    ProductInactive,
    VendorInactive,
    NotApproved,
    UnknownVariant,
    VariantRequired,
    InsufficientStock { available: u32 },
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProductNotFound => write!(f, "product no longer exists"),
            Self::ProductInactive => write!(f, "product is no longer sold"),
            Self::VendorInactive => write!(f, "vendor is not accepting orders"),
            Self::NotApproved => write!(f, "product is not approved"),
            Self::UnknownVariant => write!(f, "selected variant no longer exists"),
            Self::VariantRequired => write!(f, "a variant must be selected"),
            Self::InsufficientStock { available } => {
                write!(f, "only {} left in stock", available)
            }
        }
    }
}

/// Dropped cart line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovedLine {
    pub line_id: String,
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_key: Option<String>,
    pub quantity: u32,
    pub reason: RemovalReason,
    /// Human-readable reason
    pub message: String,
}

/// Surviving line with authoritative numbers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedLine {
    pub line_id: String,
    pub product_id: String,
    pub vendor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_key: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub cashback_amount: Decimal,
    pub display: DisplaySnapshot,
}

impl PricedLine {
    /// Freeze into an order line
    pub fn to_order_line(&self) -> OrderLine {
        OrderLine {
            product_id: self.product_id.clone(),
            vendor_id: self.vendor_id.clone(),
            variant_key: self.variant_key.clone(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price: self.total_price,
            cashback_amount: self.cashback_amount,
            display: self.display.clone(),
        }
    }
}

/// Reconciled view of a cart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub lines: Vec<PricedLine>,
    pub removed: Vec<RemovedLine>,
    pub pricing: PricingBreakdown,
    /// Present only when the attached coupon currently applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<CouponApplication>,
    /// Why the attached coupon currently contributes nothing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_rejection: Option<RejectReason>,
}

impl Reconciliation {
    pub fn removed_line_ids(&self) -> Vec<String> {
        self.removed.iter().map(|r| r.line_id.clone()).collect()
    }
}

/// `handling`, `tax`, `total` from subtotal and discount
///
/// Handling is a flat fee below the threshold and waived at or above it (or
/// by a free-shipping coupon). Tax applies to `subtotal − discount`.
pub fn compute_breakdown(
    lines: &[PricedLine],
    discount: Decimal,
    free_shipping: bool,
    config: &PricingConfig,
) -> PricingBreakdown {
    let subtotal: Decimal = lines.iter().map(|l| l.total_price).sum();
    let discount = round_money(discount.clamp(Decimal::ZERO, subtotal));
    let handling = if lines.is_empty()
        || free_shipping
        || subtotal >= config.free_handling_threshold
    {
        Decimal::ZERO
    } else {
        config.handling_fee
    };
    let taxable = (subtotal - discount).max(Decimal::ZERO);
    let tax = percent_of(taxable, config.tax_rate * Decimal::ONE_HUNDRED).max(Decimal::ZERO);
    let total = subtotal - discount + handling + tax;
    let total_cashback: Decimal = lines.iter().map(|l| l.cashback_amount).sum();

    PricingBreakdown {
        subtotal,
        discount,
        tax,
        handling,
        total,
        total_cashback,
    }
}

/// Reconciler bound to a catalog and pricing parameters
#[derive(Clone)]
pub struct PricingReconciler {
    catalog: Arc<dyn CatalogStore>,
    config: PricingConfig,
    timezone: Tz,
}

impl std::fmt::Debug for PricingReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingReconciler")
            .field("config", &self.config)
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

impl PricingReconciler {
    pub fn new(catalog: Arc<dyn CatalogStore>, config: PricingConfig, timezone: Tz) -> Self {
        Self {
            catalog,
            config,
            timezone,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Reconcile cart lines and an optional attached coupon at `now`
    pub async fn reconcile(
        &self,
        lines: &[CartLine],
        coupon: Option<&Coupon>,
        now: i64,
    ) -> CatalogResult<Reconciliation> {
        let mut priced = Vec::with_capacity(lines.len());
        let mut removed = Vec::new();

        for line in lines {
            let product = self.catalog.get_product(&line.product_id).await?;
            match check_line(line, product.as_ref()) {
                Ok(product) => priced.push(price_line(line, product, now)),
                Err(reason) => {
                    tracing::debug!(
                        line_id = %line.line_id,
                        product_id = %line.product_id,
                        reason = %reason,
                        "Cart line dropped during reconciliation"
                    );
                    removed.push(RemovedLine {
                        line_id: line.line_id.clone(),
                        product_id: line.product_id.clone(),
                        variant_key: line.variant_key.clone(),
                        quantity: line.quantity,
                        message: reason.to_string(),
                        reason,
                    });
                }
            }
        }

        let subtotal: Decimal = priced.iter().map(|l| l.total_price).sum();

        let (application, rejection, free_shipping) = match coupon {
            Some(coupon) if !priced.is_empty() => {
                let product_ids: Vec<String> = priced.iter().map(|l| l.product_id.clone()).collect();
                let category_ids: Vec<String> =
                    priced.iter().filter_map(|l| l.category_id.clone()).collect();
                let vendor_amounts = vendor_subtotals(&priced);
                let ctx = DiscountContext {
                    order_amount: subtotal,
                    product_ids: &product_ids,
                    category_ids: &category_ids,
                    vendor_amounts: &vendor_amounts,
                    now,
                    timezone: self.timezone,
                };
                match evaluate(coupon, &ctx) {
                    DiscountOutcome::Valid { discount, effect } => (
                        Some(CouponApplication {
                            coupon_id: coupon.id.clone(),
                            code: coupon.code.clone(),
                            discount_amount: discount,
                            effect,
                        }),
                        None,
                        effect == Some(CouponEffect::FreeShipping),
                    ),
                    DiscountOutcome::Rejected(reason) => (None, Some(reason), false),
                }
            }
            _ => (None, None, false),
        };

        let discount = application
            .as_ref()
            .map(|a| a.discount_amount)
            .unwrap_or(Decimal::ZERO);
        let pricing = compute_breakdown(&priced, discount, free_shipping, &self.config);

        Ok(Reconciliation {
            lines: priced,
            removed,
            pricing,
            coupon: application,
            coupon_rejection: rejection,
        })
    }
}

/// Subtotal per vendor, in first-seen order
fn vendor_subtotals(lines: &[PricedLine]) -> Vec<(String, Decimal)> {
    let mut totals: Vec<(String, Decimal)> = Vec::new();
    for line in lines {
        match totals.iter_mut().find(|(v, _)| *v == line.vendor_id) {
            Some((_, amount)) => *amount += line.total_price,
            None => totals.push((line.vendor_id.clone(), line.total_price)),
        }
    }
    totals
}

fn check_line<'a>(
    line: &CartLine,
    product: Option<&'a ProductState>,
) -> Result<&'a ProductState, RemovalReason> {
    let product = product.ok_or(RemovalReason::ProductNotFound)?;
    if !product.vendor_active {
        return Err(RemovalReason::VendorInactive);
    }
    if !product.is_active {
        return Err(RemovalReason::ProductInactive);
    }
    if product.approval != ApprovalStatus::Approved {
        return Err(RemovalReason::NotApproved);
    }
    let available = product
        .available_stock(line.variant_key.as_deref())
        .map_err(|e| match e {
            CatalogError::VariantRequired(_) => RemovalReason::VariantRequired,
            _ => RemovalReason::UnknownVariant,
        })?;
    if line.quantity > available {
        return Err(RemovalReason::InsufficientStock { available });
    }
    Ok(product)
}

fn price_line(line: &CartLine, product: &ProductState, now: i64) -> PricedLine {
    let unit_price = product.effective_unit_price(now);
    PricedLine {
        line_id: line.line_id.clone(),
        product_id: line.product_id.clone(),
        vendor_id: product.vendor_id.clone(),
        category_id: product.category_id.clone(),
        variant_key: line.variant_key.clone(),
        quantity: line.quantity,
        unit_price,
        total_price: line_total(unit_price, line.quantity),
        cashback_amount: line_total(product.cashback_per_unit, line.quantity),
        display: product.display.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::catalog::tests::product;
    use shared::models::{CouponScope, OfferKind};

    fn cart_line(id: &str, product_id: &str, quantity: u32) -> CartLine {
        CartLine {
            line_id: id.into(),
            product_id: product_id.into(),
            variant_key: None,
            quantity,
            unit_price_snapshot: Decimal::ZERO,
            line_total_snapshot: Decimal::ZERO,
            display: DisplaySnapshot::default(),
            added_at: 0,
        }
    }

    fn percent_coupon(percent: i64, min_amount: i64) -> Coupon {
        Coupon {
            id: "c-1".into(),
            code: "TEN".into(),
            offer: OfferKind::Percentage {
                percent: Decimal::from(percent),
            },
            scope: CouponScope::AllCategories,
            min_amount: Decimal::from(min_amount),
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

    fn reconciler(catalog: &MemoryCatalog) -> PricingReconciler {
        PricingReconciler::new(Arc::new(catalog.clone()), PricingConfig::default(), Tz::UTC)
    }

    #[tokio::test]
    async fn test_breakdown_without_coupon() {
        let catalog = MemoryCatalog::new();
        catalog.upsert_product(product("p-1", "v-1", 100, 10));

        let result = reconciler(&catalog)
            .reconcile(&[cart_line("l-1", "p-1", 2)], None, 0)
            .await
            .unwrap();

        assert!(result.removed.is_empty());
        assert_eq!(result.pricing.subtotal, Decimal::from(200));
        assert_eq!(result.pricing.handling, Decimal::from(50));
        assert_eq!(result.pricing.tax, Decimal::from(10));
        assert_eq!(result.pricing.total, Decimal::from(260));
    }

    #[tokio::test]
    async fn test_breakdown_with_percentage_coupon() {
        let catalog = MemoryCatalog::new();
        catalog.upsert_product(product("p-1", "v-1", 100, 10));
        let coupon = percent_coupon(10, 150);

        let result = reconciler(&catalog)
            .reconcile(&[cart_line("l-1", "p-1", 2)], Some(&coupon), 0)
            .await
            .unwrap();

        assert_eq!(result.pricing.discount, Decimal::from(20));
        assert_eq!(result.pricing.tax, Decimal::from(9));
        assert_eq!(result.pricing.total, Decimal::from(239));
        assert_eq!(result.coupon.as_ref().unwrap().discount_amount, Decimal::from(20));
    }

    #[tokio::test]
    async fn test_invalid_coupon_contributes_nothing() {
        let catalog = MemoryCatalog::new();
        catalog.upsert_product(product("p-1", "v-1", 100, 10));
        let coupon = percent_coupon(10, 500);

        let result = reconciler(&catalog)
            .reconcile(&[cart_line("l-1", "p-1", 2)], Some(&coupon), 0)
            .await
            .unwrap();

        assert!(result.coupon.is_none());
        assert!(matches!(
            result.coupon_rejection,
            Some(RejectReason::BelowMinimum { .. })
        ));
        assert_eq!(result.pricing.total, Decimal::from(260));
    }

    #[tokio::test]
    async fn test_vendor_coupon_discounts_only_its_goods() {
        let catalog = MemoryCatalog::new();
        catalog.upsert_product(product("p-1", "v-1", 100, 10));
        catalog.upsert_product(product("p-2", "v-2", 50, 10));
        let mut coupon = percent_coupon(10, 0);
        coupon.vendor_id = Some("v-2".into());

        let result = reconciler(&catalog)
            .reconcile(&[cart_line("l-1", "p-1", 2)], Some(&coupon), 0)
            .await
            .unwrap();
        assert!(result.coupon.is_none());
        assert_eq!(result.coupon_rejection, Some(RejectReason::VendorMismatch));
        assert_eq!(result.pricing.discount, Decimal::ZERO);

        let result = reconciler(&catalog)
            .reconcile(
                &[cart_line("l-1", "p-1", 2), cart_line("l-2", "p-2", 1)],
                Some(&coupon),
                0,
            )
            .await
            .unwrap();
        assert_eq!(result.pricing.subtotal, Decimal::from(250));
        assert_eq!(result.pricing.discount, Decimal::from(5));
    }

    #[tokio::test]
    async fn test_unavailable_lines_removed() {
        let catalog = MemoryCatalog::new();
        catalog.upsert_product(product("p-ok", "v-1", 100, 10));
        let mut inactive = product("p-off", "v-1", 100, 10);
        inactive.is_active = false;
        catalog.upsert_product(inactive);
        let mut closed = product("p-closed", "v-2", 100, 10);
        closed.vendor_active = false;
        catalog.upsert_product(closed);
        let mut pending = product("p-pending", "v-1", 100, 10);
        pending.approval = ApprovalStatus::Pending;
        catalog.upsert_product(pending);
        catalog.upsert_product(product("p-low", "v-1", 100, 1));

        let lines = vec![
            cart_line("l-1", "p-ok", 1),
            cart_line("l-2", "p-off", 1),
            cart_line("l-3", "p-closed", 1),
            cart_line("l-4", "p-pending", 1),
            cart_line("l-5", "p-low", 2),
            cart_line("l-6", "p-gone", 1),
        ];
        let result = reconciler(&catalog).reconcile(&lines, None, 0).await.unwrap();

        assert_eq!(result.lines.len(), 1);
        let reasons: Vec<RemovalReason> = result.removed.iter().map(|r| r.reason.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                RemovalReason::ProductInactive,
                RemovalReason::VendorInactive,
                RemovalReason::NotApproved,
                RemovalReason::InsufficientStock { available: 1 },
                RemovalReason::ProductNotFound,
            ]
        );
        assert_eq!(result.pricing.subtotal, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_handling_waived_and_cashback() {
        let catalog = MemoryCatalog::new();
        let mut p = product("p-1", "v-1", 250, 10);
        p.cashback_per_unit = Decimal::new(150, 2);
        catalog.upsert_product(p);

        let result = reconciler(&catalog)
            .reconcile(&[cart_line("l-1", "p-1", 2)], None, 0)
            .await
            .unwrap();

        assert_eq!(result.pricing.subtotal, Decimal::from(500));
        assert_eq!(result.pricing.handling, Decimal::ZERO);
        assert_eq!(result.pricing.total_cashback, Decimal::from(3));
    }

    #[tokio::test]
    async fn test_free_shipping_coupon_waives_handling() {
        let catalog = MemoryCatalog::new();
        catalog.upsert_product(product("p-1", "v-1", 100, 10));
        let mut coupon = percent_coupon(0, 0);
        coupon.offer = OfferKind::FreeShipping;

        let result = reconciler(&catalog)
            .reconcile(&[cart_line("l-1", "p-1", 1)], Some(&coupon), 0)
            .await
            .unwrap();

        assert_eq!(result.pricing.handling, Decimal::ZERO);
        assert_eq!(result.pricing.discount, Decimal::ZERO);
        assert_eq!(result.pricing.total, Decimal::from(105));
        assert_eq!(
            result.coupon.unwrap().effect,
            Some(CouponEffect::FreeShipping)
        );
    }

    #[test]
    fn test_breakdown_identity() {
        let config = PricingConfig::default();
        let lines: Vec<PricedLine> = [Decimal::new(3333, 2), Decimal::new(1999, 2)]
            .into_iter()
            .enumerate()
            .map(|(i, total)| PricedLine {
                line_id: format!("l-{}", i),
                product_id: format!("p-{}", i),
                vendor_id: "v-1".into(),
                category_id: None,
                variant_key: None,
                quantity: 1,
                unit_price: total,
                total_price: total,
                cashback_amount: Decimal::ZERO,
                display: DisplaySnapshot::default(),
            })
            .collect();

        let b = compute_breakdown(&lines, Decimal::new(777, 2), false, &config);
        assert_eq!(b.subtotal, Decimal::new(5332, 2));
        assert_eq!(b.total, b.subtotal - b.discount + b.handling + b.tax);
        assert_eq!(b.tax, b.tax.round_dp(2));
        assert!(b.tax >= Decimal::ZERO);
    }
}
