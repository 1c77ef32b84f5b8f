//! Assignment offer persistence
//!
//! Offers are keyed by `(order_id, courier_id)` and kept after they close, so
//! the vendor view shows the full history of an order. Two index tables hold
//! only the pending ones: by `offered_at` for the expiry sweep and by courier
//! for the inbox. Every write goes through `put_offer_txn`, which keeps the
//! indexes in step with the offer's status.
//!
//! Acceptance touches both the offers table and the order record inside one
//! write transaction, which is what makes first-accept-wins exclusive.

use super::{
    MarketStorage, OFFERS_TABLE, PENDING_OFFERS_BY_COURIER_TABLE, PENDING_OFFERS_BY_TIME_TABLE,
    StorageResult,
};
use redb::{ReadableTable, WriteTransaction};
use shared::models::{AssignmentOffer, OfferStatus};
use shared::order::{Order, OrderStatus};

/// Outcome of a courier accepting an offer
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptOutcome {
    /// Courier assigned; other couriers whose offers were expired
    Accepted {
        order: Order,
        expired_couriers: Vec<String>,
    },
    OfferNotFound,
    /// Offer already accepted, rejected or expired
    OfferClosed(OfferStatus),
    OrderNotReady(OrderStatus),
    AlreadyAssigned,
}

/// Outcome of a courier rejecting an offer
#[derive(Debug, Clone, PartialEq)]
pub enum RespondOutcome {
    Rejected(AssignmentOffer),
    OfferNotFound,
    OfferClosed(OfferStatus),
}

impl MarketStorage {
    fn get_offer_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
        courier_id: &str,
    ) -> StorageResult<Option<AssignmentOffer>> {
        let table = txn.open_table(OFFERS_TABLE)?;
        match table.get((order_id, courier_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn put_offer_txn(&self, txn: &WriteTransaction, offer: &AssignmentOffer) -> StorageResult<()> {
        let previous = self.get_offer_txn(txn, &offer.order_id, &offer.courier_id)?;
        let key = (offer.order_id.as_str(), offer.courier_id.as_str());

        let mut by_time = txn.open_table(PENDING_OFFERS_BY_TIME_TABLE)?;
        let mut by_courier = txn.open_table(PENDING_OFFERS_BY_COURIER_TABLE)?;
        if let Some(prev) = previous.filter(|p| p.status == OfferStatus::Pending) {
            by_time.remove((prev.offered_at, key.0, key.1))?;
            by_courier.remove((key.1, key.0))?;
        }
        if offer.status == OfferStatus::Pending {
            by_time.insert((offer.offered_at, key.0, key.1), ())?;
            by_courier.insert((key.1, key.0), offer.offered_at)?;
        }

        let mut table = txn.open_table(OFFERS_TABLE)?;
        let value = serde_json::to_vec(offer)?;
        table.insert(key, value.as_slice())?;
        Ok(())
    }

    fn offers_for_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Vec<AssignmentOffer>> {
        let table = txn.open_table(OFFERS_TABLE)?;
        let range_start: (&str, &str) = (order_id, "");
        let range_end: (&str, &str) = (order_id, "\u{ffff}");

        let mut offers = Vec::new();
        for result in table.range(range_start..=range_end)? {
            let (_key, value) = result?;
            offers.push(serde_json::from_slice::<AssignmentOffer>(value.value())?);
        }
        Ok(offers)
    }

    /// Store one broadcast round of offers atomically
    ///
    /// A courier re-offered the same order gets a fresh pending offer.
    pub fn put_offers(&self, offers: &[AssignmentOffer]) -> StorageResult<()> {
        let txn = self.begin_write()?;
        for offer in offers {
            self.put_offer_txn(&txn, offer)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Get one offer
    pub fn get_offer(&self, order_id: &str, courier_id: &str) -> StorageResult<Option<AssignmentOffer>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(OFFERS_TABLE)?;
        match table.get((order_id, courier_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All offers made for an order
    pub fn list_offers_for_order(&self, order_id: &str) -> StorageResult<Vec<AssignmentOffer>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(OFFERS_TABLE)?;
        let range_start: (&str, &str) = (order_id, "");
        let range_end: (&str, &str) = (order_id, "\u{ffff}");

        let mut offers = Vec::new();
        for result in table.range(range_start..=range_end)? {
            let (_key, value) = result?;
            offers.push(serde_json::from_slice::<AssignmentOffer>(value.value())?);
        }
        offers.sort_by_key(|o| o.offered_at);
        Ok(offers)
    }

    /// Pending offers addressed to a courier, oldest first
    pub fn list_pending_offers_for_courier(
        &self,
        courier_id: &str,
    ) -> StorageResult<Vec<AssignmentOffer>> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(PENDING_OFFERS_BY_COURIER_TABLE)?;
        let table = read_txn.open_table(OFFERS_TABLE)?;
        let range_start: (&str, &str) = (courier_id, "");
        let range_end: (&str, &str) = (courier_id, "\u{ffff}");

        let mut offers = Vec::new();
        for result in index.range(range_start..=range_end)? {
            let (key, _offered_at) = result?;
            let (_, order_id) = key.value();
            if let Some(value) = table.get((order_id, courier_id))? {
                offers.push(serde_json::from_slice::<AssignmentOffer>(value.value())?);
            }
        }
        offers.sort_by_key(|o| o.offered_at);
        Ok(offers)
    }

    /// First-accept-wins assignment
    pub fn accept_offer(
        &self,
        order_id: &str,
        courier_id: &str,
        now: i64,
    ) -> StorageResult<AcceptOutcome> {
        let txn = self.begin_write()?;

        let Some(mut offer) = self.get_offer_txn(&txn, order_id, courier_id)? else {
            return Ok(AcceptOutcome::OfferNotFound);
        };
        if offer.status != OfferStatus::Pending {
            return Ok(AcceptOutcome::OfferClosed(offer.status));
        }
        let Some(mut order) = self.get_order_txn(&txn, order_id)? else {
            return Ok(AcceptOutcome::OfferNotFound);
        };
        if order.courier_id.is_some() {
            return Ok(AcceptOutcome::AlreadyAssigned);
        }
        if order.status != OrderStatus::Ready {
            return Ok(AcceptOutcome::OrderNotReady(order.status));
        }

        offer.status = OfferStatus::Accepted;
        offer.responded_at = Some(now);
        self.put_offer_txn(&txn, &offer)?;

        let mut expired_couriers = Vec::new();
        for mut other in self.offers_for_order_txn(&txn, order_id)? {
            if other.courier_id == courier_id || other.status != OfferStatus::Pending {
                continue;
            }
            other.status = OfferStatus::Expired;
            other.responded_at = Some(now);
            self.put_offer_txn(&txn, &other)?;
            expired_couriers.push(other.courier_id);
        }

        order.courier_id = Some(courier_id.to_string());
        order.updated_at = now;
        self.put_order_txn(&txn, &order)?;

        txn.commit()?;
        Ok(AcceptOutcome::Accepted {
            order,
            expired_couriers,
        })
    }

    /// `pending → rejected`
    pub fn reject_offer(
        &self,
        order_id: &str,
        courier_id: &str,
        now: i64,
    ) -> StorageResult<RespondOutcome> {
        let txn = self.begin_write()?;
        let Some(mut offer) = self.get_offer_txn(&txn, order_id, courier_id)? else {
            return Ok(RespondOutcome::OfferNotFound);
        };
        if offer.status != OfferStatus::Pending {
            return Ok(RespondOutcome::OfferClosed(offer.status));
        }

        offer.status = OfferStatus::Rejected;
        offer.responded_at = Some(now);
        self.put_offer_txn(&txn, &offer)?;
        txn.commit()?;
        Ok(RespondOutcome::Rejected(offer))
    }

    /// Expire every pending offer of an order; returns the affected couriers
    pub fn expire_pending_offers_for_order(
        &self,
        order_id: &str,
        now: i64,
    ) -> StorageResult<Vec<String>> {
        let txn = self.begin_write()?;
        let mut expired = Vec::new();
        for mut offer in self.offers_for_order_txn(&txn, order_id)? {
            if offer.status != OfferStatus::Pending {
                continue;
            }
            offer.status = OfferStatus::Expired;
            offer.responded_at = Some(now);
            self.put_offer_txn(&txn, &offer)?;
            expired.push(offer.courier_id);
        }
        txn.commit()?;
        Ok(expired)
    }

    /// Expire pending offers made before `cutoff`
    pub fn expire_stale_offers(
        &self,
        cutoff: i64,
        now: i64,
    ) -> StorageResult<Vec<AssignmentOffer>> {
        // 无过期邀请时不占用写事务
        {
            let read_txn = self.begin_read()?;
            let index = read_txn.open_table(PENDING_OFFERS_BY_TIME_TABLE)?;
            let has_stale = match index.first()? {
                Some((key, _)) => key.value().0 < cutoff,
                None => false,
            };
            if !has_stale {
                return Ok(Vec::new());
            }
        }

        let txn = self.begin_write()?;
        let stale_keys: Vec<(String, String)> = {
            let index = txn.open_table(PENDING_OFFERS_BY_TIME_TABLE)?;
            let range_start: (i64, &str, &str) = (i64::MIN, "", "");
            let range_end: (i64, &str, &str) = (cutoff, "", "");
            let mut keys = Vec::new();
            for result in index.range(range_start..range_end)? {
                let (key, _) = result?;
                let (_, order_id, courier_id) = key.value();
                keys.push((order_id.to_string(), courier_id.to_string()));
            }
            keys
        };

        let mut expired = Vec::with_capacity(stale_keys.len());
        for (order_id, courier_id) in stale_keys {
            let Some(mut offer) = self.get_offer_txn(&txn, &order_id, &courier_id)? else {
                continue;
            };
            if offer.status != OfferStatus::Pending {
                continue;
            }
            offer.status = OfferStatus::Expired;
            offer.responded_at = Some(now);
            self.put_offer_txn(&txn, &offer)?;
            expired.push(offer);
        }
        txn.commit()?;
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::orders::tests::sample_order;
    use redb::ReadableTableMetadata;

    impl MarketStorage {
        fn pending_offer_index_len(&self) -> StorageResult<(u64, u64)> {
            let read_txn = self.begin_read()?;
            let by_time = read_txn.open_table(PENDING_OFFERS_BY_TIME_TABLE)?;
            let by_courier = read_txn.open_table(PENDING_OFFERS_BY_COURIER_TABLE)?;
            Ok((by_time.len()?, by_courier.len()?))
        }
    }

    fn ready_order(storage: &MarketStorage, id: &str) {
        let mut order = sample_order(id, "u-1", &["v-1"], 100);
        order.status = OrderStatus::Ready;
        let txn = storage.begin_write().unwrap();
        storage.insert_order_txn(&txn, &order).unwrap();
        txn.commit().unwrap();
    }

    fn offer_to(storage: &MarketStorage, order_id: &str, couriers: &[&str], at: i64) {
        let offers: Vec<AssignmentOffer> = couriers
            .iter()
            .map(|c| AssignmentOffer::pending(order_id, format!("ORD-{}", order_id), *c, at))
            .collect();
        storage.put_offers(&offers).unwrap();
    }

    #[test]
    fn test_first_accept_wins() {
        let storage = MarketStorage::open_in_memory().unwrap();
        ready_order(&storage, "o-1");
        offer_to(&storage, "o-1", &["c-1", "c-2", "c-3"], 1_000);

        match storage.accept_offer("o-1", "c-2", 2_000).unwrap() {
            AcceptOutcome::Accepted {
                order,
                mut expired_couriers,
            } => {
                assert_eq!(order.courier_id.as_deref(), Some("c-2"));
                expired_couriers.sort();
                assert_eq!(expired_couriers, vec!["c-1", "c-3"]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(
            storage.accept_offer("o-1", "c-1", 2_100).unwrap(),
            AcceptOutcome::OfferClosed(OfferStatus::Expired)
        );
        assert_eq!(
            storage.get_order("o-1").unwrap().unwrap().courier_id.as_deref(),
            Some("c-2")
        );

        let statuses: Vec<OfferStatus> = storage
            .list_offers_for_order("o-1")
            .unwrap()
            .into_iter()
            .map(|o| o.status)
            .collect();
        assert_eq!(
            statuses
                .iter()
                .filter(|s| **s == OfferStatus::Accepted)
                .count(),
            1
        );
    }

    #[test]
    fn test_accept_requires_ready_order() {
        let storage = MarketStorage::open_in_memory().unwrap();
        let order = sample_order("o-1", "u-1", &["v-1"], 100);
        let txn = storage.begin_write().unwrap();
        storage.insert_order_txn(&txn, &order).unwrap();
        txn.commit().unwrap();
        offer_to(&storage, "o-1", &["c-1"], 1_000);

        assert_eq!(
            storage.accept_offer("o-1", "c-1", 2_000).unwrap(),
            AcceptOutcome::OrderNotReady(OrderStatus::Pending)
        );
        assert_eq!(
            storage.accept_offer("o-1", "c-9", 2_000).unwrap(),
            AcceptOutcome::OfferNotFound
        );
    }

    #[test]
    fn test_reject_and_inbox() {
        let storage = MarketStorage::open_in_memory().unwrap();
        ready_order(&storage, "o-1");
        ready_order(&storage, "o-2");
        offer_to(&storage, "o-1", &["c-1"], 1_000);
        offer_to(&storage, "o-2", &["c-1", "c-2"], 1_500);

        assert_eq!(storage.list_pending_offers_for_courier("c-1").unwrap().len(), 2);
        assert!(matches!(
            storage.reject_offer("o-1", "c-1", 2_000).unwrap(),
            RespondOutcome::Rejected(o) if o.status == OfferStatus::Rejected
        ));
        assert_eq!(
            storage.reject_offer("o-1", "c-1", 2_100).unwrap(),
            RespondOutcome::OfferClosed(OfferStatus::Rejected)
        );

        let inbox = storage.list_pending_offers_for_courier("c-1").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].order_id, "o-2");
    }

    #[test]
    fn test_expiry() {
        let storage = MarketStorage::open_in_memory().unwrap();
        ready_order(&storage, "o-1");
        ready_order(&storage, "o-2");
        offer_to(&storage, "o-1", &["c-1"], 1_000);
        offer_to(&storage, "o-2", &["c-1", "c-2"], 5_000);

        let stale = storage.expire_stale_offers(2_000, 6_000).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].order_id, "o-1");

        let mut expired = storage.expire_pending_offers_for_order("o-2", 6_000).unwrap();
        expired.sort();
        assert_eq!(expired, vec!["c-1", "c-2"]);
        assert!(storage.list_pending_offers_for_courier("c-1").unwrap().is_empty());

        // history stays in the offers table, the pending indexes are empty
        assert_eq!(storage.list_offers_for_order("o-2").unwrap().len(), 2);
        assert_eq!(storage.pending_offer_index_len().unwrap(), (0, 0));
    }

    #[test]
    fn test_pending_indexes_follow_status() {
        let storage = MarketStorage::open_in_memory().unwrap();
        ready_order(&storage, "o-1");
        ready_order(&storage, "o-2");
        offer_to(&storage, "o-1", &["c-1", "c-2"], 1_000);
        offer_to(&storage, "o-2", &["c-1"], 3_000);
        assert_eq!(storage.pending_offer_index_len().unwrap(), (3, 3));

        storage.reject_offer("o-1", "c-2", 1_500).unwrap();
        assert_eq!(storage.pending_offer_index_len().unwrap(), (2, 2));

        // re-offer moves the time key instead of leaving the old one behind
        offer_to(&storage, "o-1", &["c-1"], 4_000);
        assert_eq!(storage.pending_offer_index_len().unwrap(), (2, 2));
        assert!(storage.expire_stale_offers(2_000, 5_000).unwrap().is_empty());

        let stale = storage.expire_stale_offers(3_500, 5_000).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].order_id, "o-2");

        let inbox = storage.list_pending_offers_for_courier("c-1").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].order_id, "o-1");
        assert_eq!(inbox[0].offered_at, 4_000);

        match storage.accept_offer("o-1", "c-1", 5_100).unwrap() {
            AcceptOutcome::Accepted { .. } => {}
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(storage.pending_offer_index_len().unwrap(), (0, 0));
        assert_eq!(storage.list_offers_for_order("o-1").unwrap().len(), 2);
    }
}
