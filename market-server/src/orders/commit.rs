//! Order Commit Pipeline
//!
//! Turns the caller's cart into an immutable order:
//!
//! 1. reconcile + prune (removed lines are reported, survivors proceed)
//! 2. debit inventory line by line, restocking on any failure
//! 3. one redb write transaction: cart version check, coupon consumption,
//!    order number allocation, order + indexes, idempotency key, cart clear
//!
//! A failure in step 3 aborts the transaction and restocks every debit, so
//! nothing of a failed attempt survives.

use super::error::{CheckoutError, CheckoutResult};
use super::number::{MAX_ALLOCATION_ATTEMPTS, OrderNumberSource};
use crate::cart::CartStore;
use crate::catalog::{CatalogStore, DebitOutcome};
use crate::pricing::{Reconciliation, RejectReason, RemovedLine};
use crate::storage::{CouponConsumption, MarketStorage};
use chrono_tz::Tz;
use dashmap::DashMap;
use serde::Serialize;
use shared::models::Cart;
use shared::order::{Order, OrderLine, OrderStatus, PaymentInfo, PaymentMethod, ShippingAddress};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Checkout input
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    /// Client key; a replay returns the order it created
    pub idempotency_key: Option<String>,
    /// Abort with `CartAdjusted` instead of proceeding when lines were removed
    pub require_unchanged: bool,
}

/// Checkout result
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub order: Order,
    /// Lines dropped by reconciliation
    pub removed: Vec<RemovedLine>,
    /// `true` when an idempotency key matched an existing order
    pub replayed: bool,
}

/// Debited line, kept for compensation
#[derive(Debug, Clone)]
struct Debit {
    product_id: String,
    variant_key: Option<String>,
    quantity: u32,
}

pub struct CommitPipeline {
    storage: MarketStorage,
    carts: CartStore,
    numbers: Arc<dyn OrderNumberSource>,
    timezone: Tz,
    /// Per-user checkout lock
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for CommitPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitPipeline")
            .field("timezone", &self.timezone)
            .field("locked_users", &self.user_locks.len())
            .finish_non_exhaustive()
    }
}

impl CommitPipeline {
    pub fn new(
        storage: MarketStorage,
        carts: CartStore,
        numbers: Arc<dyn OrderNumberSource>,
        timezone: Tz,
    ) -> Self {
        Self {
            storage,
            carts,
            numbers,
            timezone,
            user_locks: DashMap::new(),
        }
    }

    fn catalog(&self) -> &Arc<dyn CatalogStore> {
        self.carts.reconciler().catalog()
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Commit the user's cart
    pub async fn commit(
        &self,
        user_id: &str,
        request: CheckoutRequest,
        now: i64,
    ) -> CheckoutResult<CheckoutOutcome> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if let Some(key) = request.idempotency_key.as_deref()
            && let Some(order_id) = self.storage.get_idempotent_order_id(user_id, key)?
        {
            let order = self
                .storage
                .get_order(&order_id)?
                .ok_or_else(|| CheckoutError::OrderNotFound(order_id.clone()))?;
            tracing::info!(user_id = %user_id, order_id = %order.id, "Checkout replayed by idempotency key");
            return Ok(CheckoutOutcome {
                order,
                removed: Vec::new(),
                replayed: true,
            });
        }

        // 1. reconcile + prune
        let (cart, reconciliation) = self.carts.reconcile_and_prune(user_id, now).await?;
        if reconciliation.lines.is_empty() {
            if reconciliation.removed.is_empty() {
                return Err(CheckoutError::EmptyCart);
            }
            return Err(CheckoutError::NoAvailableItems {
                removed: reconciliation.removed,
            });
        }
        if request.require_unchanged && !reconciliation.removed.is_empty() {
            return Err(CheckoutError::CartAdjusted {
                removed: reconciliation.removed,
            });
        }

        // A use that ran out since the coupon was applied is a lost race, not a
        // silent price change
        if let Some(coupon_ref) = &cart.coupon
            && matches!(
                reconciliation.coupon_rejection,
                Some(RejectReason::UsageExhausted)
            )
        {
            return Err(CheckoutError::CouponExhausted(coupon_ref.code.clone()));
        }

        // 2. debit inventory
        let debits = self.debit_all(&reconciliation).await?;

        // 3. persist
        match self.persist(user_id, &cart, &reconciliation, &request, now) {
            Ok(order) => {
                tracing::info!(
                    user_id = %user_id,
                    order_id = %order.id,
                    order_number = %order.order_number,
                    total = %order.pricing.total,
                    lines = order.lines.len(),
                    "Order committed"
                );
                Ok(CheckoutOutcome {
                    order,
                    removed: reconciliation.removed,
                    replayed: false,
                })
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Order persistence failed, restocking");
                self.restock(&debits).await;
                Err(e)
            }
        }
    }

    async fn debit_all(&self, reconciliation: &Reconciliation) -> CheckoutResult<Vec<Debit>> {
        let mut debits: Vec<Debit> = Vec::with_capacity(reconciliation.lines.len());
        for line in &reconciliation.lines {
            let outcome = self
                .catalog()
                .debit_inventory(&line.product_id, line.variant_key.as_deref(), line.quantity)
                .await;
            match outcome {
                Ok(DebitOutcome::Applied) => debits.push(Debit {
                    product_id: line.product_id.clone(),
                    variant_key: line.variant_key.clone(),
                    quantity: line.quantity,
                }),
                Ok(DebitOutcome::Insufficient { available }) => {
                    tracing::info!(
                        product_id = %line.product_id,
                        requested = line.quantity,
                        available,
                        "Inventory debit lost the race"
                    );
                    self.restock(&debits).await;
                    return Err(CheckoutError::InsufficientInventory {
                        product_id: line.product_id.clone(),
                    });
                }
                Err(e) => {
                    self.restock(&debits).await;
                    return Err(e.into());
                }
            }
        }
        Ok(debits)
    }

    async fn restock(&self, debits: &[Debit]) {
        for debit in debits {
            if let Err(e) = self
                .catalog()
                .restock_inventory(&debit.product_id, debit.variant_key.as_deref(), debit.quantity)
                .await
            {
                tracing::error!(
                    product_id = %debit.product_id,
                    quantity = debit.quantity,
                    error = %e,
                    "Failed to restock after aborted checkout"
                );
            }
        }
    }

    /// Single write transaction; dropping it on error aborts every write
    fn persist(
        &self,
        user_id: &str,
        cart: &Cart,
        reconciliation: &Reconciliation,
        request: &CheckoutRequest,
        now: i64,
    ) -> CheckoutResult<Order> {
        let txn = self.storage.begin_write()?;

        let current_version = self
            .storage
            .get_cart_txn(&txn, user_id)?
            .map(|c| c.version)
            .unwrap_or_default();
        if current_version != cart.version {
            return Err(CheckoutError::CartChanged);
        }

        if let Some(application) = &reconciliation.coupon {
            match self.storage.consume_coupon_txn(&txn, &application.coupon_id)? {
                CouponConsumption::Consumed(coupon) => {
                    tracing::debug!(
                        coupon_id = %coupon.id,
                        used_count = coupon.used_count,
                        "Coupon use consumed"
                    );
                }
                CouponConsumption::LimitReached => {
                    return Err(CheckoutError::CouponExhausted(application.code.clone()));
                }
                CouponConsumption::Inactive => {
                    return Err(CheckoutError::CouponInvalid(RejectReason::Inactive));
                }
                CouponConsumption::NotFound => {
                    return Err(CheckoutError::CouponNotFound(application.code.clone()));
                }
            }
        }

        let order_number = self.allocate_number(&txn, now)?;

        let lines: Vec<OrderLine> = reconciliation
            .lines
            .iter()
            .map(|l| l.to_order_line())
            .collect();
        let order = Order {
            id: uuid::Uuid::new_v4().to_string(),
            order_number,
            user_id: user_id.to_string(),
            vendor_ids: Order::collect_vendor_ids(&lines),
            lines,
            pricing: reconciliation.pricing.clone(),
            coupon: reconciliation.coupon.clone(),
            shipping_address: request.shipping_address.clone(),
            payment: PaymentInfo::initial(request.payment_method),
            status: OrderStatus::Pending,
            courier_id: None,
            notes: request.notes.clone(),
            status_history: Vec::new(),
            created_at: now,
            updated_at: now,
            broadcast_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
        };
        self.storage.insert_order_txn(&txn, &order)?;

        if let Some(key) = request.idempotency_key.as_deref() {
            self.storage
                .put_idempotency_key_txn(&txn, user_id, key, &order.id)?;
        }

        let mut cleared = cart.clone();
        cleared.clear();
        cleared.version += 1;
        cleared.updated_at = now;
        self.storage.put_cart_txn(&txn, &cleared)?;

        txn.commit().map_err(crate::storage::StorageError::from)?;
        Ok(order)
    }

    fn allocate_number(&self, txn: &redb::WriteTransaction, now: i64) -> CheckoutResult<String> {
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let candidate = self.numbers.candidate(now, self.timezone);
            if !self.storage.order_number_exists_txn(txn, &candidate)? {
                return Ok(candidate);
            }
            tracing::warn!(attempt, candidate = %candidate, "Order number collision");
        }
        tracing::error!(
            attempts = MAX_ALLOCATION_ATTEMPTS,
            "Order number allocation exhausted"
        );
        Err(CheckoutError::OrderNumberAllocationFailed {
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }
}
