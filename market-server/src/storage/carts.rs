//! Cart persistence

use super::{CARTS_TABLE, MarketStorage, StorageError, StorageResult};
use redb::{ReadableTable, WriteTransaction};
use shared::models::Cart;

impl MarketStorage {
    /// Get a user's cart
    pub fn get_cart(&self, user_id: &str) -> StorageResult<Option<Cart>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(CARTS_TABLE)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get a user's cart (within transaction)
    pub fn get_cart_txn(&self, txn: &WriteTransaction, user_id: &str) -> StorageResult<Option<Cart>> {
        let table = txn.open_table(CARTS_TABLE)?;
        match table.get(user_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Store a cart as-is (within transaction)
    pub fn put_cart_txn(&self, txn: &WriteTransaction, cart: &Cart) -> StorageResult<()> {
        let mut table = txn.open_table(CARTS_TABLE)?;
        let value = serde_json::to_vec(cart)?;
        table.insert(cart.user_id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Read-modify-write a cart in one transaction
    ///
    /// The cart is created lazily. When `f` succeeds the empty-cart invariant
    /// is enforced, the version is bumped and the cart is committed; when it
    /// fails nothing is written.
    pub fn update_cart<T, E, F>(&self, user_id: &str, now: i64, f: F) -> Result<(Cart, T), E>
    where
        F: FnOnce(&mut Cart) -> Result<T, E>,
        E: From<StorageError>,
    {
        let txn = self.begin_write()?;
        let mut cart = self
            .get_cart_txn(&txn, user_id)?
            .unwrap_or_else(|| Cart::new(user_id));

        let out = f(&mut cart)?;

        cart.enforce_empty_invariant();
        cart.version += 1;
        cart.updated_at = now;
        self.put_cart_txn(&txn, &cart)?;
        txn.commit().map_err(StorageError::from)?;
        Ok((cart, out))
    }

    /// Remove lines from a cart if it is still at `expected_version`
    ///
    /// Returns the pruned cart, or `None` when the cart moved on (or vanished)
    /// since it was read.
    pub fn prune_cart_lines(
        &self,
        user_id: &str,
        expected_version: u64,
        line_ids: &[String],
        now: i64,
    ) -> StorageResult<Option<Cart>> {
        let txn = self.begin_write()?;
        let Some(mut cart) = self.get_cart_txn(&txn, user_id)? else {
            return Ok(None);
        };
        if cart.version != expected_version {
            return Ok(None);
        }

        cart.remove_lines(line_ids);
        cart.version += 1;
        cart.updated_at = now;
        self.put_cart_txn(&txn, &cart)?;
        txn.commit()?;
        Ok(Some(cart))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::models::{CartLine, DisplaySnapshot};

    fn line(id: &str) -> CartLine {
        CartLine {
            line_id: id.into(),
            product_id: format!("p-{}", id),
            variant_key: None,
            quantity: 1,
            unit_price_snapshot: Decimal::from(5),
            line_total_snapshot: Decimal::from(5),
            display: DisplaySnapshot::default(),
            added_at: 0,
        }
    }

    #[test]
    fn test_update_cart_creates_and_bumps_version() {
        let storage = MarketStorage::open_in_memory().unwrap();

        let (cart, _) = storage
            .update_cart::<_, StorageError, _>("u-1", 10, |cart| {
                cart.lines.push(line("a"));
                Ok(())
            })
            .unwrap();
        assert_eq!(cart.version, 1);
        assert_eq!(cart.updated_at, 10);

        let stored = storage.get_cart("u-1").unwrap().unwrap();
        assert_eq!(stored, cart);
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let storage = MarketStorage::open_in_memory().unwrap();
        let result: Result<(Cart, ()), StorageError> = storage.update_cart("u-1", 10, |cart| {
            cart.lines.push(line("a"));
            Err(StorageError::Serialization(serde_json::from_str::<u8>("x").unwrap_err()))
        });
        assert!(result.is_err());
        assert!(storage.get_cart("u-1").unwrap().is_none());
    }

    #[test]
    fn test_prune_requires_matching_version() {
        let storage = MarketStorage::open_in_memory().unwrap();
        storage
            .update_cart::<_, StorageError, _>("u-1", 1, |cart| {
                cart.lines.push(line("a"));
                cart.lines.push(line("b"));
                Ok(())
            })
            .unwrap();

        assert!(
            storage
                .prune_cart_lines("u-1", 99, &["a".into()], 2)
                .unwrap()
                .is_none()
        );

        let pruned = storage
            .prune_cart_lines("u-1", 1, &["a".into()], 2)
            .unwrap()
            .unwrap();
        assert_eq!(pruned.lines.len(), 1);
        assert_eq!(pruned.version, 2);
    }
}
