//! Order Lifecycle State Machine
//!
//! ```text
//! pending → confirmed → processing → ready → out_for_delivery → delivered
//!    └──────────┴────────────┴─────────┴────────────┴──→ cancelled | refunded
//! ```
//!
//! Every transition is a conditional update inside one redb write transaction:
//! the legality check runs against the committed state, so two racing
//! transitions can never both apply. Side effects (restock, broadcast, push)
//! run after the commit and never fail the transition.

use super::error::{CheckoutError, CheckoutResult};
use crate::catalog::CatalogStore;
use crate::courier::CourierBroadcaster;
use shared::message::{OfferCloseReason, PushPayload};
use shared::models::Actor;
use shared::order::{Order, OrderStatus, PaymentStatus, StatusChange};
use std::sync::Arc;

/// Statuses reachable from `from`, ignoring who asks
pub fn legal_successors(from: OrderStatus) -> Vec<OrderStatus> {
    if from.is_terminal() {
        return Vec::new();
    }
    let mut next: Vec<OrderStatus> = from.forward().into_iter().collect();
    next.push(OrderStatus::Cancelled);
    next.push(OrderStatus::Refunded);
    next
}

/// 谁可以发起哪个状态变更
fn actor_may(order: &Order, actor: &Actor, to: OrderStatus) -> bool {
    use OrderStatus::*;

    if actor.is_privileged() {
        return true;
    }
    let from = order.status;
    match actor {
        Actor::User(id) => {
            *id == order.user_id && to == Cancelled && matches!(from, Pending | Confirmed | Processing)
        }
        Actor::Vendor(id) => {
            order.has_vendor(id)
                && match to {
                    Confirmed | Processing | Ready => true,
                    Cancelled => matches!(from, Pending | Confirmed | Processing | Ready),
                    _ => false,
                }
        }
        Actor::Courier(id) => {
            order.courier_id.as_deref() == Some(id.as_str())
                && match to {
                    OutForDelivery | Delivered => true,
                    Cancelled => matches!(from, Ready | OutForDelivery),
                    _ => false,
                }
        }
        Actor::Admin(_) | Actor::System => true,
    }
}

/// Transitions `actor` may request on `order` right now
pub fn allowed_transitions(order: &Order, actor: &Actor) -> Vec<OrderStatus> {
    legal_successors(order.status)
        .into_iter()
        .filter(|to| actor_may(order, actor, *to))
        .collect()
}

/// Whether `actor` may see `order`
pub fn can_view(order: &Order, actor: &Actor) -> bool {
    match actor {
        Actor::User(id) => *id == order.user_id,
        Actor::Vendor(id) => order.has_vendor(id),
        Actor::Courier(id) => order.courier_id.as_deref() == Some(id.as_str()),
        Actor::Admin(_) | Actor::System => true,
    }
}

/// Work left for after the commit
enum AfterCommit {
    Nothing,
    Broadcast,
    Cancelled,
}

#[derive(Clone)]
pub struct OrderLifecycle {
    storage: crate::storage::MarketStorage,
    catalog: Arc<dyn CatalogStore>,
    broadcaster: CourierBroadcaster,
}

impl std::fmt::Debug for OrderLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderLifecycle").finish_non_exhaustive()
    }
}

impl OrderLifecycle {
    pub fn new(
        storage: crate::storage::MarketStorage,
        catalog: Arc<dyn CatalogStore>,
        broadcaster: CourierBroadcaster,
    ) -> Self {
        Self {
            storage,
            catalog,
            broadcaster,
        }
    }

    pub fn get_order(&self, order_id: &str, actor: &Actor) -> CheckoutResult<Order> {
        let order = self
            .storage
            .get_order(order_id)?
            .ok_or_else(|| CheckoutError::OrderNotFound(order_id.to_string()))?;
        if !can_view(&order, actor) {
            // 不泄露订单是否存在
            return Err(CheckoutError::OrderNotFound(order_id.to_string()));
        }
        Ok(order)
    }

    /// User view or vendor view, newest first
    pub fn list_orders(&self, actor: &Actor) -> CheckoutResult<Vec<Order>> {
        match actor {
            Actor::User(id) => Ok(self.storage.list_user_orders(id)?),
            Actor::Vendor(id) => Ok(self.storage.list_vendor_orders(id)?),
            other => Err(CheckoutError::PermissionDenied(format!(
                "{} has no order listing",
                other
            ))),
        }
    }

    /// Apply a status change requested by `actor`
    pub async fn transition(
        &self,
        order_id: &str,
        to: OrderStatus,
        actor: &Actor,
        note: Option<String>,
        now: i64,
    ) -> CheckoutResult<Order> {
        let updated = self.storage.update_order(order_id, |order| {
            let from = order.status;
            if from.is_terminal() {
                return Err(CheckoutError::OrderAlreadyTerminal(from));
            }
            if !legal_successors(from).contains(&to) {
                return Err(CheckoutError::InvalidTransition { from, to });
            }
            if !actor_may(order, actor, to) {
                return Err(CheckoutError::PermissionDenied(format!(
                    "{} may not move order from {} to {}",
                    actor, from, to
                )));
            }

            order.status = to;
            order.updated_at = now;
            order.status_history.push(StatusChange {
                from,
                to,
                actor: actor.clone(),
                at: now,
                note: note.clone(),
            });

            let after = match to {
                OrderStatus::Ready if order.broadcast_at.is_none() => {
                    order.broadcast_at = Some(now);
                    AfterCommit::Broadcast
                }
                OrderStatus::Delivered => {
                    if order.delivered_at.is_none() {
                        order.delivered_at = Some(now);
                    }
                    // 货到付款：送达即收款
                    if order.payment.method.is_deferred()
                        && order.payment.status == PaymentStatus::Pending
                    {
                        order.payment.status = PaymentStatus::Paid;
                        order.payment.settled_at = Some(now);
                    }
                    AfterCommit::Nothing
                }
                OrderStatus::Cancelled | OrderStatus::Refunded => {
                    order.cancelled_at = Some(now);
                    order.cancelled_by = Some(actor.clone());
                    order.cancel_reason = note.clone();
                    // 仅已扣款的预付订单退款，其余一律失败
                    order.payment.status = if order.payment.status == PaymentStatus::Paid {
                        PaymentStatus::Refunded
                    } else {
                        PaymentStatus::Failed
                    };
                    AfterCommit::Cancelled
                }
                _ => AfterCommit::Nothing,
            };
            Ok::<_, CheckoutError>(after)
        })?;

        let Some((order, after)) = updated else {
            return Err(CheckoutError::OrderNotFound(order_id.to_string()));
        };

        tracing::info!(
            order_id = %order.id,
            status = %order.status,
            actor = %actor,
            "Order status changed"
        );

        match after {
            AfterCommit::Broadcast => {
                self.broadcaster.broadcast(&order, now).await;
            }
            AfterCommit::Cancelled => {
                self.restock_lines(&order).await;
                self.broadcaster
                    .close_offers(&order.id, OfferCloseReason::OrderCancelled, now)
                    .await;
            }
            AfterCommit::Nothing => {}
        }

        self.broadcaster
            .notify(
                &order.user_id,
                PushPayload::OrderStatusChanged {
                    order_id: order.id.clone(),
                    order_number: order.order_number.clone(),
                    status: order.status,
                },
            )
            .await;

        Ok(order)
    }

    /// Cancellation with a reason
    pub async fn cancel(
        &self,
        order_id: &str,
        actor: &Actor,
        reason: Option<String>,
        now: i64,
    ) -> CheckoutResult<Order> {
        self.transition(order_id, OrderStatus::Cancelled, actor, reason, now)
            .await
    }

    /// External payment collaborator settles an upfront payment
    pub fn settle_payment(
        &self,
        order_id: &str,
        success: bool,
        actor: &Actor,
        now: i64,
    ) -> CheckoutResult<Order> {
        if !actor.is_privileged() {
            return Err(CheckoutError::PermissionDenied(format!(
                "{} may not settle payments",
                actor
            )));
        }

        let updated = self.storage.update_order(order_id, |order| {
            if !matches!(
                order.payment.status,
                PaymentStatus::Pending | PaymentStatus::Processing
            ) || order.status.is_terminal()
            {
                return Err(CheckoutError::PaymentAlreadySettled);
            }
            order.payment.status = if success {
                PaymentStatus::Paid
            } else {
                PaymentStatus::Failed
            };
            order.payment.settled_at = Some(now);
            order.updated_at = now;
            Ok(())
        })?;

        let (order, ()) = updated.ok_or_else(|| CheckoutError::OrderNotFound(order_id.to_string()))?;
        tracing::info!(
            order_id = %order.id,
            payment_status = ?order.payment.status,
            "Payment settled"
        );
        Ok(order)
    }

    /// Replace the order notes while it is still open
    pub fn set_notes(
        &self,
        order_id: &str,
        actor: &Actor,
        notes: Option<String>,
        now: i64,
    ) -> CheckoutResult<Order> {
        let updated = self.storage.update_order(order_id, |order| {
            let owner = actor.user_id() == Some(order.user_id.as_str());
            if !owner && !actor.is_privileged() {
                return Err(CheckoutError::PermissionDenied(format!(
                    "{} may not edit notes",
                    actor
                )));
            }
            if order.status.is_terminal() {
                return Err(CheckoutError::OrderAlreadyTerminal(order.status));
            }
            order.notes = notes;
            order.updated_at = now;
            Ok(())
        })?;
        updated
            .map(|(order, ())| order)
            .ok_or_else(|| CheckoutError::OrderNotFound(order_id.to_string()))
    }

    async fn restock_lines(&self, order: &Order) {
        for line in &order.lines {
            if let Err(e) = self
                .catalog
                .restock_inventory(&line.product_id, line.variant_key.as_deref(), line.quantity)
                .await
            {
                tracing::error!(
                    order_id = %order.id,
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    error = %e,
                    "Restock after cancellation failed"
                );
            }
        }
    }
}
