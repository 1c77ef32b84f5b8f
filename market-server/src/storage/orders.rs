//! Order persistence and indexes

use super::{
    IDEMPOTENCY_TABLE, MarketStorage, ORDER_NUMBERS_TABLE, ORDERS_TABLE, StorageError,
    StorageResult, USER_ORDERS_TABLE, VENDOR_ORDERS_TABLE,
};
use redb::{ReadableTable, TableDefinition, WriteTransaction};
use shared::order::Order;

impl MarketStorage {
    // ========== Reads ==========

    /// Get an order by internal id
    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get an order (within transaction)
    pub fn get_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Find an order by its human-readable number
    pub fn find_order_by_number(&self, order_number: &str) -> StorageResult<Option<Order>> {
        let order_id = {
            let read_txn = self.begin_read()?;
            let table = read_txn.open_table(ORDER_NUMBERS_TABLE)?;
            match table.get(order_number)? {
                Some(id) => id.value().to_string(),
                None => return Ok(None),
            }
        };
        self.get_order(&order_id)
    }

    /// Orders placed by a user, newest first
    pub fn list_user_orders(&self, user_id: &str) -> StorageResult<Vec<Order>> {
        self.list_indexed_orders(USER_ORDERS_TABLE, user_id)
    }

    /// Orders containing lines of a vendor, newest first
    pub fn list_vendor_orders(&self, vendor_id: &str) -> StorageResult<Vec<Order>> {
        self.list_indexed_orders(VENDOR_ORDERS_TABLE, vendor_id)
    }

    fn list_indexed_orders(
        &self,
        index: TableDefinition<'static, (&'static str, &'static str), i64>,
        owner: &str,
    ) -> StorageResult<Vec<Order>> {
        let read_txn = self.begin_read()?;
        let index_table = read_txn.open_table(index)?;
        let orders_table = read_txn.open_table(ORDERS_TABLE)?;

        let mut orders = Vec::new();
        let range_start: (&str, &str) = (owner, "");
        let range_end: (&str, &str) = (owner, "\u{ffff}");

        for result in index_table.range(range_start..=range_end)? {
            let (key, _created_at) = result?;
            let (_, order_id) = key.value();
            if let Some(value) = orders_table.get(order_id)? {
                orders.push(serde_json::from_slice::<Order>(value.value())?);
            }
        }

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    // ========== Writes ==========

    /// Whether an order number is taken (within transaction)
    pub fn order_number_exists_txn(
        &self,
        txn: &WriteTransaction,
        order_number: &str,
    ) -> StorageResult<bool> {
        let table = txn.open_table(ORDER_NUMBERS_TABLE)?;
        Ok(table.get(order_number)?.is_some())
    }

    /// Insert a new order with its number and owner indexes
    pub fn insert_order_txn(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        self.put_order_txn(txn, order)?;

        let mut numbers = txn.open_table(ORDER_NUMBERS_TABLE)?;
        numbers.insert(order.order_number.as_str(), order.id.as_str())?;

        let mut user_index = txn.open_table(USER_ORDERS_TABLE)?;
        user_index.insert((order.user_id.as_str(), order.id.as_str()), order.created_at)?;

        let mut vendor_index = txn.open_table(VENDOR_ORDERS_TABLE)?;
        for vendor_id in &order.vendor_ids {
            vendor_index.insert((vendor_id.as_str(), order.id.as_str()), order.created_at)?;
        }
        Ok(())
    }

    /// Overwrite an order record (within transaction)
    pub fn put_order_txn(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        let mut table = txn.open_table(ORDERS_TABLE)?;
        let value = serde_json::to_vec(order)?;
        table.insert(order.id.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Read-modify-write an order in one transaction
    ///
    /// `f` sees the current committed state and decides whether to mutate it;
    /// returning an error aborts without writing. `Ok(None)` means the order
    /// does not exist.
    pub fn update_order<T, E, F>(&self, order_id: &str, f: F) -> Result<Option<(Order, T)>, E>
    where
        F: FnOnce(&mut Order) -> Result<T, E>,
        E: From<StorageError>,
    {
        let txn = self.begin_write()?;
        let Some(mut order) = self.get_order_txn(&txn, order_id)? else {
            return Ok(None);
        };

        let out = f(&mut order)?;

        self.put_order_txn(&txn, &order)?;
        txn.commit().map_err(StorageError::from)?;
        Ok(Some((order, out)))
    }

    // ========== Idempotency ==========

    /// Order id previously created with this key, if any
    pub fn get_idempotent_order_id(&self, user_id: &str, key: &str) -> StorageResult<Option<String>> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(IDEMPOTENCY_TABLE)?;
        Ok(table.get((user_id, key))?.map(|v| v.value().to_string()))
    }

    /// Same as [`Self::get_idempotent_order_id`] (within transaction)
    pub fn get_idempotent_order_id_txn(
        &self,
        txn: &WriteTransaction,
        user_id: &str,
        key: &str,
    ) -> StorageResult<Option<String>> {
        let table = txn.open_table(IDEMPOTENCY_TABLE)?;
        Ok(table.get((user_id, key))?.map(|v| v.value().to_string()))
    }

    /// Map a key to the order it created (within transaction)
    pub fn put_idempotency_key_txn(
        &self,
        txn: &WriteTransaction,
        user_id: &str,
        key: &str,
        order_id: &str,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(IDEMPOTENCY_TABLE)?;
        table.insert((user_id, key), order_id)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::models::DisplaySnapshot;
    use shared::order::{
        OrderLine, OrderStatus, PaymentInfo, PaymentMethod, PricingBreakdown, ShippingAddress,
    };

    pub(crate) fn sample_order(id: &str, user: &str, vendors: &[&str], created_at: i64) -> Order {
        let lines: Vec<OrderLine> = vendors
            .iter()
            .map(|v| OrderLine {
                product_id: format!("p-{}", v),
                vendor_id: v.to_string(),
                variant_key: None,
                quantity: 1,
                unit_price: Decimal::TEN,
                total_price: Decimal::TEN,
                cashback_amount: Decimal::ZERO,
                display: DisplaySnapshot::default(),
            })
            .collect();
        Order {
            id: id.into(),
            order_number: format!("ORD-{}", id),
            user_id: user.into(),
            vendor_ids: Order::collect_vendor_ids(&lines),
            lines,
            pricing: PricingBreakdown::default(),
            coupon: None,
            shipping_address: ShippingAddress {
                recipient: "A".into(),
                phone: "1".into(),
                line1: "Street 1".into(),
                line2: None,
                city: "Town".into(),
                postal_code: None,
            },
            payment: PaymentInfo::initial(PaymentMethod::CashOnDelivery),
            status: OrderStatus::Pending,
            courier_id: None,
            notes: None,
            status_history: vec![],
            created_at,
            updated_at: created_at,
            broadcast_at: None,
            delivered_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancel_reason: None,
        }
    }

    fn insert(storage: &MarketStorage, order: &Order) {
        let txn = storage.begin_write().unwrap();
        storage.insert_order_txn(&txn, order).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn test_indexes_list_newest_first() {
        let storage = MarketStorage::open_in_memory().unwrap();
        insert(&storage, &sample_order("o-1", "u-1", &["v-1"], 100));
        insert(&storage, &sample_order("o-2", "u-1", &["v-1", "v-2"], 200));
        insert(&storage, &sample_order("o-3", "u-2", &["v-2"], 300));
        // Prefix neighbour must not leak into u-1's listing
        insert(&storage, &sample_order("o-4", "u-10", &["v-3"], 400));

        let ids: Vec<String> = storage
            .list_user_orders("u-1")
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec!["o-2", "o-1"]);

        let vendor_ids: Vec<String> = storage
            .list_vendor_orders("v-2")
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(vendor_ids, vec!["o-3", "o-2"]);

        let by_number = storage.find_order_by_number("ORD-o-3").unwrap().unwrap();
        assert_eq!(by_number.id, "o-3");
    }

    #[test]
    fn test_update_order_aborts_on_error() {
        let storage = MarketStorage::open_in_memory().unwrap();
        insert(&storage, &sample_order("o-1", "u-1", &["v-1"], 100));

        let result: Result<Option<(Order, ())>, StorageError> =
            storage.update_order("o-1", |order| {
                order.status = OrderStatus::Confirmed;
                Err(StorageError::Serialization(
                    serde_json::from_str::<u8>("x").unwrap_err(),
                ))
            });
        assert!(result.is_err());
        assert_eq!(
            storage.get_order("o-1").unwrap().unwrap().status,
            OrderStatus::Pending
        );

        let missing: Option<(Order, ())> = storage
            .update_order::<_, StorageError, _>("nope", |_| Ok(()))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_idempotency_keys_scoped_per_user() {
        let storage = MarketStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        storage
            .put_idempotency_key_txn(&txn, "u-1", "k-1", "o-1")
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(
            storage.get_idempotent_order_id("u-1", "k-1").unwrap(),
            Some("o-1".to_string())
        );
        assert!(storage.get_idempotent_order_id("u-2", "k-1").unwrap().is_none());
    }
}
