//! Coupon persistence and usage accounting

use super::{COUPON_CODES_TABLE, COUPONS_TABLE, MarketStorage, StorageResult};
use redb::{ReadableTable, WriteTransaction};
use shared::models::Coupon;

/// Result of an attempt to take one use of a coupon
#[derive(Debug, Clone, PartialEq)]
pub enum CouponConsumption {
    /// `used_count` was incremented; carries the updated coupon
    Consumed(Coupon),
    /// `used_count` already at `usage_limit`
    LimitReached,
    /// Coupon deactivated since it was applied
    Inactive,
    NotFound,
}

impl MarketStorage {
    /// Insert a new coupon
    ///
    /// Returns `false` without writing when the code is already taken.
    pub fn insert_coupon(&self, coupon: &Coupon) -> StorageResult<bool> {
        let txn = self.begin_write()?;
        {
            let mut codes = txn.open_table(COUPON_CODES_TABLE)?;
            if codes.get(coupon.code.as_str())?.is_some() {
                return Ok(false);
            }
            codes.insert(coupon.code.as_str(), coupon.id.as_str())?;
        }
        self.put_coupon_txn(&txn, coupon)?;
        txn.commit()?;
        Ok(true)
    }

    /// Get a coupon by id
    pub fn get_coupon(&self, coupon_id: &str) -> StorageResult<Option<Coupon>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(COUPONS_TABLE)?;
        match table.get(coupon_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Find a coupon by normalized code
    pub fn find_coupon_by_code(&self, code: &str) -> StorageResult<Option<Coupon>> {
        let coupon_id = {
            let read_txn = self.begin_read()?;
            let table = read_txn.open_table(COUPON_CODES_TABLE)?;
            match table.get(code)? {
                Some(id) => id.value().to_string(),
                None => return Ok(None),
            }
        };
        self.get_coupon(&coupon_id)
    }

    /// Set `is_active`; returns the updated coupon
    pub fn set_coupon_active(&self, coupon_id: &str, active: bool) -> StorageResult<Option<Coupon>> {
        let txn = self.begin_write()?;
        let Some(mut coupon) = self.get_coupon_txn(&txn, coupon_id)? else {
            return Ok(None);
        };
        coupon.is_active = active;
        self.put_coupon_txn(&txn, &coupon)?;
        txn.commit()?;
        Ok(Some(coupon))
    }

    fn get_coupon_txn(&self, txn: &WriteTransaction, coupon_id: &str) -> StorageResult<Option<Coupon>> {
        let table = txn.open_table(COUPONS_TABLE)?;
        match table.get(coupon_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn put_coupon_txn(&self, txn: &WriteTransaction, coupon: &Coupon) -> StorageResult<()> {
        let mut table = txn.open_table(COUPONS_TABLE)?;
        let value = serde_json::to_vec(coupon)?;
        table.insert(coupon.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Take one use of a coupon (within transaction)
    ///
    /// Check and increment happen in the caller's write transaction, so two
    /// concurrent checkouts can never both take the last use.
    pub fn consume_coupon_txn(
        &self,
        txn: &WriteTransaction,
        coupon_id: &str,
    ) -> StorageResult<CouponConsumption> {
        let Some(mut coupon) = self.get_coupon_txn(txn, coupon_id)? else {
            return Ok(CouponConsumption::NotFound);
        };
        if !coupon.is_active {
            return Ok(CouponConsumption::Inactive);
        }
        if !coupon.has_remaining_uses() {
            return Ok(CouponConsumption::LimitReached);
        }

        coupon.used_count += 1;
        self.put_coupon_txn(txn, &coupon)?;
        Ok(CouponConsumption::Consumed(coupon))
    }

    /// Take one use of a coupon in its own transaction
    pub fn consume_coupon(&self, coupon_id: &str) -> StorageResult<CouponConsumption> {
        let txn = self.begin_write()?;
        let outcome = self.consume_coupon_txn(&txn, coupon_id)?;
        if matches!(outcome, CouponConsumption::Consumed(_)) {
            txn.commit()?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::models::{CouponScope, OfferKind};

    pub(crate) fn sample_coupon(id: &str, code: &str, usage_limit: Option<u32>) -> Coupon {
        Coupon {
            id: id.into(),
            code: code.into(),
            offer: OfferKind::Fixed {
                amount: Decimal::from(20),
            },
            scope: CouponScope::AllCategories,
            min_amount: Decimal::ZERO,
            max_amount: None,
            valid_from: None,
            valid_until: None,
            usage_limit,
            used_count: 0,
            is_active: true,
            vendor_id: None,
            created_by: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let storage = MarketStorage::open_in_memory().unwrap();
        assert!(storage.insert_coupon(&sample_coupon("c-1", "SAVE20", None)).unwrap());
        assert!(!storage.insert_coupon(&sample_coupon("c-2", "SAVE20", None)).unwrap());
        assert!(storage.get_coupon("c-2").unwrap().is_none());
        assert_eq!(
            storage.find_coupon_by_code("SAVE20").unwrap().unwrap().id,
            "c-1"
        );
    }

    #[test]
    fn test_consume_stops_at_limit() {
        let storage = MarketStorage::open_in_memory().unwrap();
        storage.insert_coupon(&sample_coupon("c-1", "ONCE", Some(2))).unwrap();

        assert!(matches!(
            storage.consume_coupon("c-1").unwrap(),
            CouponConsumption::Consumed(c) if c.used_count == 1
        ));
        assert!(matches!(
            storage.consume_coupon("c-1").unwrap(),
            CouponConsumption::Consumed(c) if c.used_count == 2
        ));
        assert_eq!(
            storage.consume_coupon("c-1").unwrap(),
            CouponConsumption::LimitReached
        );
        assert_eq!(storage.get_coupon("c-1").unwrap().unwrap().used_count, 2);
        assert_eq!(
            storage.consume_coupon("missing").unwrap(),
            CouponConsumption::NotFound
        );
    }

    #[test]
    fn test_inactive_coupon_not_consumed() {
        let storage = MarketStorage::open_in_memory().unwrap();
        storage.insert_coupon(&sample_coupon("c-1", "OFF", None)).unwrap();
        storage.set_coupon_active("c-1", false).unwrap();
        assert_eq!(
            storage.consume_coupon("c-1").unwrap(),
            CouponConsumption::Inactive
        );
    }

    #[test]
    fn test_uncommitted_consumption_is_discarded() {
        let storage = MarketStorage::open_in_memory().unwrap();
        storage.insert_coupon(&sample_coupon("c-1", "ONCE", Some(1))).unwrap();
        {
            let txn = storage.begin_write().unwrap();
            let outcome = storage.consume_coupon_txn(&txn, "c-1").unwrap();
            assert!(matches!(outcome, CouponConsumption::Consumed(_)));
            // dropped without commit
        }
        assert_eq!(storage.get_coupon("c-1").unwrap().unwrap().used_count, 0);
    }
}
