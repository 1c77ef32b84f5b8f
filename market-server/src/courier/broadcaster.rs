//! Courier Assignment Broadcaster
//!
//! On the first transition of an order into `ready`, every eligible courier
//! receives a pending offer. Delivery goes through the push channel; a
//! courier without a live connection gets a durable notification as well.
//! Nothing in here fails the transition that triggered it.

use super::channel::{DeliveryStatus, PushChannel};
use crate::catalog::CourierDirectory;
use crate::message::NotificationQueue;
use crate::orders::{CheckoutError, CheckoutResult};
use crate::storage::{AcceptOutcome, MarketStorage, RespondOutcome};
use serde::Serialize;
use shared::message::{OfferCloseReason, PushMessage, PushPayload};
use shared::models::AssignmentOffer;
use shared::order::Order;
use std::sync::Arc;

/// Broadcast summary
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Offers created, independent of delivery
    pub offered_count: usize,
    pub delivered: usize,
    pub queued: usize,
}

/// How a single notification ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notified {
    Delivered,
    Queued,
    /// Neither channel accepted it; already logged
    Dropped,
}

#[derive(Clone)]
pub struct CourierBroadcaster {
    storage: MarketStorage,
    couriers: Arc<dyn CourierDirectory>,
    channel: Arc<dyn PushChannel>,
    queue: Arc<dyn NotificationQueue>,
}

impl std::fmt::Debug for CourierBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierBroadcaster").finish_non_exhaustive()
    }
}

impl CourierBroadcaster {
    pub fn new(
        storage: MarketStorage,
        couriers: Arc<dyn CourierDirectory>,
        channel: Arc<dyn PushChannel>,
        queue: Arc<dyn NotificationQueue>,
    ) -> Self {
        Self {
            storage,
            couriers,
            channel,
            queue,
        }
    }

    /// Push with durable fallback, best effort
    pub async fn notify(&self, recipient_id: &str, payload: PushPayload) -> Notified {
        let message = PushMessage::new(recipient_id, payload);
        match self.channel.send_to(message.clone()).await {
            Ok(DeliveryStatus::Delivered) => return Notified::Delivered,
            Ok(DeliveryStatus::NotConnected) => {}
            Err(e) => {
                tracing::warn!(recipient_id = %recipient_id, error = %e, "Push failed, falling back to queue");
            }
        }

        match self.queue.enqueue(message).await {
            Ok(()) => Notified::Queued,
            Err(e) => {
                tracing::warn!(recipient_id = %recipient_id, error = %e, "Durable queue unavailable, notification dropped");
                Notified::Dropped
            }
        }
    }

    /// Offer a ready order to every eligible courier
    pub async fn broadcast(&self, order: &Order, now: i64) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let couriers = match self.couriers.eligible_couriers(&order.vendor_ids).await {
            Ok(couriers) => couriers,
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Courier lookup failed, nothing broadcast");
                return report;
            }
        };
        if couriers.is_empty() {
            tracing::warn!(
                order_id = %order.id,
                vendor_ids = ?order.vendor_ids,
                "No eligible couriers, order stays ready"
            );
            return report;
        }

        let offers: Vec<AssignmentOffer> = couriers
            .iter()
            .map(|c| AssignmentOffer::pending(&order.id, &order.order_number, &c.id, now))
            .collect();
        if let Err(e) = self.storage.put_offers(&offers) {
            tracing::error!(order_id = %order.id, error = %e, "Failed to persist assignment offers");
            return report;
        }
        report.offered_count = offers.len();

        for offer in &offers {
            let payload = PushPayload::AssignmentOffered {
                order_id: order.id.clone(),
                order_number: order.order_number.clone(),
                vendor_ids: order.vendor_ids.clone(),
                total: order.pricing.total,
                offered_at: now,
            };
            match self.notify(&offer.courier_id, payload).await {
                Notified::Delivered => report.delivered += 1,
                Notified::Queued => report.queued += 1,
                Notified::Dropped => {}
            }
        }

        tracing::info!(
            order_id = %order.id,
            offered = report.offered_count,
            delivered = report.delivered,
            queued = report.queued,
            "Assignment offers broadcast"
        );
        report
    }

    /// Tell couriers with pending offers that the round is over
    pub async fn close_offers(&self, order_id: &str, reason: OfferCloseReason, now: i64) -> usize {
        let couriers = match self.storage.expire_pending_offers_for_order(order_id, now) {
            Ok(couriers) => couriers,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Failed to expire pending offers");
                return 0;
            }
        };
        for courier_id in &couriers {
            self.notify(
                courier_id,
                PushPayload::OfferClosed {
                    order_id: order_id.to_string(),
                    reason,
                },
            )
            .await;
        }
        couriers.len()
    }

    /// First-accept-wins
    pub async fn accept(&self, order_id: &str, courier_id: &str, now: i64) -> CheckoutResult<Order> {
        match self.storage.accept_offer(order_id, courier_id, now)? {
            AcceptOutcome::Accepted {
                order,
                expired_couriers,
            } => {
                tracing::info!(
                    order_id = %order_id,
                    courier_id = %courier_id,
                    closed = expired_couriers.len(),
                    "Courier assigned"
                );
                for other in &expired_couriers {
                    self.notify(
                        other,
                        PushPayload::OfferClosed {
                            order_id: order_id.to_string(),
                            reason: OfferCloseReason::TakenByOther,
                        },
                    )
                    .await;
                }
                Ok(order)
            }
            AcceptOutcome::OfferNotFound => Err(CheckoutError::OfferNotFound),
            AcceptOutcome::OfferClosed(status) => Err(CheckoutError::OfferClosed(status)),
            AcceptOutcome::OrderNotReady(status) => Err(CheckoutError::OrderNotReady(status)),
            AcceptOutcome::AlreadyAssigned => Err(CheckoutError::OrderAlreadyAssigned),
        }
    }

    pub async fn reject(
        &self,
        order_id: &str,
        courier_id: &str,
        now: i64,
    ) -> CheckoutResult<AssignmentOffer> {
        match self.storage.reject_offer(order_id, courier_id, now)? {
            RespondOutcome::Rejected(offer) => {
                tracing::info!(order_id = %order_id, courier_id = %courier_id, "Offer rejected");
                Ok(offer)
            }
            RespondOutcome::OfferNotFound => Err(CheckoutError::OfferNotFound),
            RespondOutcome::OfferClosed(status) => Err(CheckoutError::OfferClosed(status)),
        }
    }

    /// Every offer made for one order, vendor view
    pub fn offers_for_order(&self, order_id: &str) -> CheckoutResult<Vec<AssignmentOffer>> {
        Ok(self.storage.list_offers_for_order(order_id)?)
    }

    /// Courier inbox
    pub fn pending_offers(&self, courier_id: &str) -> CheckoutResult<Vec<AssignmentOffer>> {
        Ok(self.storage.list_pending_offers_for_courier(courier_id)?)
    }

    /// Expire offers older than `ttl_ms`
    pub async fn expire_stale(&self, ttl_ms: i64, now: i64) -> usize {
        let expired = match self.storage.expire_stale_offers(now - ttl_ms, now) {
            Ok(expired) => expired,
            Err(e) => {
                tracing::error!(error = %e, "Offer expiry sweep failed");
                return 0;
            }
        };
        for offer in &expired {
            self.notify(
                &offer.courier_id,
                PushPayload::OfferClosed {
                    order_id: offer.order_id.clone(),
                    reason: OfferCloseReason::Expired,
                },
            )
            .await;
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired stale assignment offers");
        }
        expired.len()
    }
}
