//! Cart Store
//!
//! Owns the per-user cart. Every mutation validates against the catalog
//! before it is persisted, and every read goes through the reconciler, which
//! prunes lines that can no longer be sold from the stored cart.

use crate::catalog::ProductState;
use crate::orders::{CheckoutError, CheckoutResult};
use crate::pricing::{PricingReconciler, Reconciliation, money::line_total};
use crate::storage::MarketStorage;
use serde::Serialize;
use shared::models::{Cart, CartLine, Coupon, MAX_LINE_QUANTITY};
use shared::util::normalize_code;

/// Cart together with its reconciled pricing
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart: Cart,
    pub reconciliation: Reconciliation,
}

/// Add-line command
#[derive(Debug, Clone)]
pub struct AddLine {
    pub product_id: String,
    pub variant_key: Option<String>,
    pub quantity: u32,
}

#[derive(Clone)]
pub struct CartStore {
    storage: MarketStorage,
    reconciler: PricingReconciler,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore").finish_non_exhaustive()
    }
}

fn validate_quantity(quantity: u32) -> CheckoutResult<()> {
    if quantity == 0 {
        return Err(CheckoutError::Validation(
            "quantity must be at least 1".into(),
        ));
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(CheckoutError::Validation(format!(
            "quantity exceeds maximum allowed ({})",
            MAX_LINE_QUANTITY
        )));
    }
    Ok(())
}

impl CartStore {
    pub fn new(storage: MarketStorage, reconciler: PricingReconciler) -> Self {
        Self {
            storage,
            reconciler,
        }
    }

    pub fn reconciler(&self) -> &PricingReconciler {
        &self.reconciler
    }

    /// Coupon referenced by a cart, if it still exists
    fn attached_coupon(&self, cart: &Cart) -> CheckoutResult<Option<Coupon>> {
        match &cart.coupon {
            Some(coupon_ref) => Ok(self.storage.get_coupon(&coupon_ref.coupon_id)?),
            None => Ok(None),
        }
    }

    /// Reconcile the stored cart and prune removed lines
    ///
    /// Repeating the call without an intervening mutation yields the same
    /// pricing and no further removals. A cart that moved on concurrently is
    /// reconciled again from its new state.
    pub async fn reconcile_and_prune(
        &self,
        user_id: &str,
        now: i64,
    ) -> CheckoutResult<(Cart, Reconciliation)> {
        const MAX_PRUNE_ATTEMPTS: usize = 3;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let cart = self
                .storage
                .get_cart(user_id)?
                .unwrap_or_else(|| Cart::new(user_id));
            let coupon = self.attached_coupon(&cart)?;
            let reconciliation = self
                .reconciler
                .reconcile(&cart.lines, coupon.as_ref(), now)
                .await?;

            if reconciliation.removed.is_empty() {
                return Ok((cart, reconciliation));
            }

            let removed_ids = reconciliation.removed_line_ids();
            match self
                .storage
                .prune_cart_lines(user_id, cart.version, &removed_ids, now)?
            {
                Some(pruned) => {
                    tracing::info!(
                        user_id = %user_id,
                        removed = removed_ids.len(),
                        "Pruned unavailable cart lines"
                    );
                    return Ok((pruned, reconciliation));
                }
                None if attempt < MAX_PRUNE_ATTEMPTS => continue,
                None => return Err(CheckoutError::CartChanged),
            }
        }
    }

    /// Reconciled view of the caller's cart
    pub async fn view(&self, user_id: &str, now: i64) -> CheckoutResult<CartView> {
        let (cart, reconciliation) = self.reconcile_and_prune(user_id, now).await?;
        Ok(CartView {
            cart,
            reconciliation,
        })
    }

    async fn sellable_product(&self, product_id: &str) -> CheckoutResult<ProductState> {
        let product = self
            .reconciler
            .catalog()
            .get_product(product_id)
            .await?
            .ok_or_else(|| CheckoutError::ProductNotFound(product_id.to_string()))?;
        if !product.is_sellable() {
            return Err(CheckoutError::ProductUnavailable {
                product_id: product_id.to_string(),
            });
        }
        Ok(product)
    }

    fn check_stock(
        product: &ProductState,
        variant_key: Option<&str>,
        quantity: u32,
    ) -> CheckoutResult<()> {
        // unknown / missing variant surfaces as a catalog validation error
        let available = product.available_stock(variant_key)?;
        if quantity > available {
            return Err(CheckoutError::InsufficientInventory {
                product_id: product.id.clone(),
            });
        }
        Ok(())
    }

    /// Add a line, merging with an existing line for the same product+variant
    pub async fn add_line(&self, user_id: &str, cmd: AddLine, now: i64) -> CheckoutResult<CartView> {
        validate_quantity(cmd.quantity)?;
        let product = self.sellable_product(&cmd.product_id).await?;
        // validates the variant key before touching the cart
        product.available_stock(cmd.variant_key.as_deref())?;

        let unit_price = product.effective_unit_price(now);
        self.storage.update_cart(user_id, now, |cart| {
            let variant = cmd.variant_key.as_deref();
            let quantity = match cart
                .lines
                .iter()
                .find(|l| l.same_item(&cmd.product_id, variant))
            {
                Some(existing) => existing.quantity + cmd.quantity,
                None => cmd.quantity,
            };
            validate_quantity(quantity)?;
            Self::check_stock(&product, variant, quantity)?;

            match cart
                .lines
                .iter_mut()
                .find(|l| l.same_item(&cmd.product_id, variant))
            {
                Some(line) => {
                    line.quantity = quantity;
                    line.unit_price_snapshot = unit_price;
                    line.line_total_snapshot = line_total(unit_price, quantity);
                    line.display = product.display.clone();
                }
                None => cart.lines.push(CartLine {
                    line_id: uuid::Uuid::new_v4().to_string(),
                    product_id: cmd.product_id.clone(),
                    variant_key: cmd.variant_key.clone(),
                    quantity,
                    unit_price_snapshot: unit_price,
                    line_total_snapshot: line_total(unit_price, quantity),
                    display: product.display.clone(),
                    added_at: now,
                }),
            }
            Ok::<_, CheckoutError>(())
        })?;

        tracing::debug!(user_id = %user_id, product_id = %cmd.product_id, "Cart line added");
        self.view(user_id, now).await
    }

    /// Set the quantity of a line
    pub async fn update_line(
        &self,
        user_id: &str,
        line_id: &str,
        quantity: u32,
        now: i64,
    ) -> CheckoutResult<CartView> {
        validate_quantity(quantity)?;
        let line = self
            .storage
            .get_cart(user_id)?
            .and_then(|c| c.lines.into_iter().find(|l| l.line_id == line_id))
            .ok_or_else(|| CheckoutError::CartLineNotFound(line_id.to_string()))?;
        let product = self.sellable_product(&line.product_id).await?;
        Self::check_stock(&product, line.variant_key.as_deref(), quantity)?;

        let unit_price = product.effective_unit_price(now);
        self.storage.update_cart(user_id, now, |cart| {
            let line = cart
                .find_line_mut(line_id)
                .ok_or_else(|| CheckoutError::CartLineNotFound(line_id.to_string()))?;
            line.quantity = quantity;
            line.unit_price_snapshot = unit_price;
            line.line_total_snapshot = line_total(unit_price, quantity);
            Ok::<_, CheckoutError>(())
        })?;

        self.view(user_id, now).await
    }

    /// Remove a line; removing the last line also drops the coupon
    pub async fn remove_line(&self, user_id: &str, line_id: &str, now: i64) -> CheckoutResult<CartView> {
        self.storage.update_cart(user_id, now, |cart| {
            if cart.remove_lines(&[line_id.to_string()]) == 0 {
                return Err(CheckoutError::CartLineNotFound(line_id.to_string()));
            }
            Ok(())
        })?;
        self.view(user_id, now).await
    }

    /// Drop every line and the coupon
    pub async fn clear(&self, user_id: &str, now: i64) -> CheckoutResult<CartView> {
        self.storage.update_cart(user_id, now, |cart| {
            cart.clear();
            Ok::<_, CheckoutError>(())
        })?;
        self.view(user_id, now).await
    }

    /// Attach a coupon by code
    ///
    /// The coupon must evaluate valid against the current reconciled cart;
    /// otherwise the rejection reason is returned and the cart is unchanged.
    /// Usage is not consumed here.
    pub async fn apply_coupon(&self, user_id: &str, code: &str, now: i64) -> CheckoutResult<CartView> {
        let code = normalize_code(code);
        let coupon = self
            .storage
            .find_coupon_by_code(&code)?
            .ok_or_else(|| CheckoutError::CouponNotFound(code.clone()))?;

        let (cart, _) = self.reconcile_and_prune(user_id, now).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let preview = self
            .reconciler
            .reconcile(&cart.lines, Some(&coupon), now)
            .await?;
        if let Some(reason) = preview.coupon_rejection {
            return Err(CheckoutError::CouponInvalid(reason));
        }

        let coupon_ref = coupon.to_ref();
        self.storage.update_cart(user_id, now, |cart| {
            if cart.is_empty() {
                return Err(CheckoutError::EmptyCart);
            }
            cart.coupon = Some(coupon_ref);
            Ok(())
        })?;

        tracing::info!(user_id = %user_id, code = %code, "Coupon applied to cart");
        self.view(user_id, now).await
    }

    /// Detach the coupon
    pub async fn remove_coupon(&self, user_id: &str, now: i64) -> CheckoutResult<CartView> {
        self.storage.update_cart(user_id, now, |cart| {
            cart.coupon = None;
            Ok::<_, CheckoutError>(())
        })?;
        self.view(user_id, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::product;
    use crate::catalog::{MemoryCatalog, VariantState};
    use crate::core::PricingConfig;
    use chrono_tz::Tz;
    use rust_decimal::Decimal;
    use shared::models::{CouponScope, OfferKind};
    use std::sync::Arc;

    fn store() -> (CartStore, MemoryCatalog, MarketStorage) {
        let storage = MarketStorage::open_in_memory().unwrap();
        let catalog = MemoryCatalog::new();
        let reconciler =
            PricingReconciler::new(Arc::new(catalog.clone()), PricingConfig::default(), Tz::UTC);
        (CartStore::new(storage.clone(), reconciler), catalog, storage)
    }

    fn add(product_id: &str, quantity: u32) -> AddLine {
        AddLine {
            product_id: product_id.into(),
            variant_key: None,
            quantity,
        }
    }

    fn insert_coupon(storage: &MarketStorage, code: &str, percent: i64, min_amount: i64) {
        let coupon = Coupon {
            id: format!("id-{}", code),
            code: code.into(),
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
        };
        storage.insert_coupon(&coupon).unwrap();
    }

    #[tokio::test]
    async fn test_add_merges_same_item() {
        let (store, catalog, _) = store();
        catalog.upsert_product(product("p-1", "v-1", 100, 10));

        store.add_line("u-1", add("p-1", 1), 0).await.unwrap();
        let view = store.add_line("u-1", add("p-1", 2), 0).await.unwrap();

        assert_eq!(view.cart.lines.len(), 1);
        assert_eq!(view.cart.lines[0].quantity, 3);
        assert_eq!(view.reconciliation.pricing.subtotal, Decimal::from(300));
    }

    #[tokio::test]
    async fn test_add_validation() {
        let (store, catalog, _) = store();
        let mut p = product("p-1", "v-1", 100, 10);
        p.variants.insert("xl".into(), VariantState { stock: 5 });
        catalog.upsert_product(p);

        assert!(matches!(
            store.add_line("u-1", add("p-1", 0), 0).await,
            Err(CheckoutError::Validation(_))
        ));
        assert!(matches!(
            store.add_line("u-1", add("p-1", 10_000), 0).await,
            Err(CheckoutError::Validation(_))
        ));
        // variant-bearing product without a variant
        assert!(matches!(
            store.add_line("u-1", add("p-1", 1), 0).await,
            Err(CheckoutError::Catalog(_))
        ));
        let unknown = AddLine {
            variant_key: Some("xs".into()),
            ..add("p-1", 1)
        };
        assert!(matches!(
            store.add_line("u-1", unknown, 0).await,
            Err(CheckoutError::Catalog(_))
        ));
        assert!(matches!(
            store.add_line("u-1", add("p-missing", 1), 0).await,
            Err(CheckoutError::ProductNotFound(_))
        ));
        assert!(store.storage.get_cart("u-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_remove_line() {
        let (store, catalog, _) = store();
        catalog.upsert_product(product("p-1", "v-1", 100, 10));
        let view = store.add_line("u-1", add("p-1", 1), 0).await.unwrap();
        let line_id = view.cart.lines[0].line_id.clone();

        let view = store.update_line("u-1", &line_id, 4, 0).await.unwrap();
        assert_eq!(view.cart.lines[0].quantity, 4);

        assert!(matches!(
            store.update_line("u-1", &line_id, 11, 0).await,
            Err(CheckoutError::InsufficientInventory { .. })
        ));
        assert!(matches!(
            store.update_line("u-1", "nope", 1, 0).await,
            Err(CheckoutError::CartLineNotFound(_))
        ));

        let view = store.remove_line("u-1", &line_id, 0).await.unwrap();
        assert!(view.cart.is_empty());
    }

    #[tokio::test]
    async fn test_coupon_apply_and_last_line_removal() {
        let (store, catalog, storage) = store();
        catalog.upsert_product(product("p-1", "v-1", 100, 10));
        insert_coupon(&storage, "TEN", 10, 150);

        assert!(matches!(
            store.apply_coupon("u-1", "ten", 0).await,
            Err(CheckoutError::EmptyCart)
        ));

        let view = store.add_line("u-1", add("p-1", 1), 0).await.unwrap();
        assert!(matches!(
            store.apply_coupon("u-1", " ten ", 0).await,
            Err(CheckoutError::CouponInvalid(_))
        ));

        let line_id = view.cart.lines[0].line_id.clone();
        store.update_line("u-1", &line_id, 2, 0).await.unwrap();
        let view = store.apply_coupon("u-1", "ten", 0).await.unwrap();
        assert_eq!(view.reconciliation.pricing.total, Decimal::from(239));
        assert_eq!(view.cart.coupon.as_ref().unwrap().code, "TEN");
        // preview only; usage is consumed at checkout
        assert_eq!(storage.get_coupon("id-TEN").unwrap().unwrap().used_count, 0);

        let view = store.remove_line("u-1", &line_id, 0).await.unwrap();
        assert!(view.cart.coupon.is_none());

        assert!(matches!(
            store.apply_coupon("u-1", "NOPE", 0).await,
            Err(CheckoutError::CouponNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reconcile_prunes_once() {
        let (store, catalog, _) = store();
        catalog.upsert_product(product("p-1", "v-1", 100, 10));
        catalog.upsert_product(product("p-2", "v-2", 50, 10));
        store.add_line("u-1", add("p-1", 2), 0).await.unwrap();
        store.add_line("u-1", add("p-2", 1), 0).await.unwrap();

        catalog.modify_product("p-2", |p| p.is_active = false);

        let first = store.view("u-1", 0).await.unwrap();
        assert_eq!(first.reconciliation.removed.len(), 1);
        assert_eq!(first.cart.lines.len(), 1);

        let second = store.view("u-1", 0).await.unwrap();
        assert!(second.reconciliation.removed.is_empty());
        assert_eq!(second.reconciliation.pricing, first.reconciliation.pricing);
    }

    #[tokio::test]
    async fn test_clear_and_remove_coupon() {
        let (store, catalog, storage) = store();
        catalog.upsert_product(product("p-1", "v-1", 100, 10));
        insert_coupon(&storage, "TEN", 10, 0);
        store.add_line("u-1", add("p-1", 1), 0).await.unwrap();
        store.apply_coupon("u-1", "TEN", 0).await.unwrap();

        let view = store.remove_coupon("u-1", 0).await.unwrap();
        assert!(view.cart.coupon.is_none());
        assert_eq!(view.cart.lines.len(), 1);

        let view = store.clear("u-1", 0).await.unwrap();
        assert!(view.cart.is_empty());
        assert!(view.cart.coupon.is_none());
    }
}
