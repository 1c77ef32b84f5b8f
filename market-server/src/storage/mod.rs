//! redb-based storage layer for carts, orders, coupons, offers and the
//! durable notification queue
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `carts` | `user_id` | `Cart` | One cart per user |
//! | `orders` | `order_id` | `Order` | Order records |
//! | `order_numbers` | `order_number` | `order_id` | Uniqueness of human-readable numbers |
//! | `user_orders` | `(user_id, order_id)` | `created_at` | User view index |
//! | `vendor_orders` | `(vendor_id, order_id)` | `created_at` | Vendor view index |
//! | `coupons` | `coupon_id` | `Coupon` | Coupon definitions + usage |
//! | `coupon_codes` | normalized code | `coupon_id` | Code lookup / uniqueness |
//! | `offers` | `(order_id, courier_id)` | `AssignmentOffer` | Courier offers, history included |
//! | `pending_offers_by_time` | `(offered_at, order_id, courier_id)` | `()` | Expiry sweep index |
//! | `pending_offers_by_courier` | `(courier_id, order_id)` | `offered_at` | Courier inbox index |
//! | `idempotency_keys` | `(user_id, key)` | `order_id` | Replayed checkout detection |
//! | `notification_queue` | `task_id` | `NotificationTask` | Fallback deliveries |
//! | `notification_dead_letter` | `task_id` | `NotificationTask` | Exhausted deliveries |
//!
//! # Atomicity
//!
//! redb serializes write transactions. Every read-check-write done inside a
//! single write transaction is therefore atomic with respect to every other
//! writer; coupon consumption, order persistence, offer acceptance and
//! order status updates all rely on this.
//!
//! Note: redb operations are synchronous. They are short and are called
//! directly from async code.

mod carts;
mod coupons;
mod notifications;
mod offers;
mod orders;

pub use coupons::CouponConsumption;
pub use notifications::{DeadLetterEntry, NotificationTask};
pub use offers::{AcceptOutcome, RespondOutcome};

use redb::{Database, ReadTransaction, ReadableDatabase, TableDefinition, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub(crate) const CARTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("carts");

pub(crate) const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

pub(crate) const ORDER_NUMBERS_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("order_numbers");

pub(crate) const USER_ORDERS_TABLE: TableDefinition<(&str, &str), i64> =
    TableDefinition::new("user_orders");

pub(crate) const VENDOR_ORDERS_TABLE: TableDefinition<(&str, &str), i64> =
    TableDefinition::new("vendor_orders");

pub(crate) const COUPONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("coupons");

pub(crate) const COUPON_CODES_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("coupon_codes");

pub(crate) const OFFERS_TABLE: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("offers");

/// Pending offers only
pub(crate) const PENDING_OFFERS_BY_TIME_TABLE: TableDefinition<(i64, &str, &str), ()> =
    TableDefinition::new("pending_offers_by_time");

/// Pending offers only
pub(crate) const PENDING_OFFERS_BY_COURIER_TABLE: TableDefinition<(&str, &str), i64> =
    TableDefinition::new("pending_offers_by_courier");

pub(crate) const IDEMPOTENCY_TABLE: TableDefinition<(&str, &str), &str> =
    TableDefinition::new("idempotency_keys");

pub(crate) const NOTIFICATION_QUEUE_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("notification_queue");

pub(crate) const NOTIFICATION_DEAD_LETTER_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("notification_dead_letter");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Marketplace storage backed by redb
#[derive(Clone)]
pub struct MarketStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for MarketStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketStorage").finish_non_exhaustive()
    }
}

impl MarketStorage {
    /// Open or create the database at the given path
    ///
    /// redb uses `Durability::Immediate` by default: commits are persistent
    /// as soon as `commit()` returns.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests and embedded use)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        // Create all tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CARTS_TABLE)?;
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(ORDER_NUMBERS_TABLE)?;
            let _ = write_txn.open_table(USER_ORDERS_TABLE)?;
            let _ = write_txn.open_table(VENDOR_ORDERS_TABLE)?;
            let _ = write_txn.open_table(COUPONS_TABLE)?;
            let _ = write_txn.open_table(COUPON_CODES_TABLE)?;
            let _ = write_txn.open_table(OFFERS_TABLE)?;
            let _ = write_txn.open_table(PENDING_OFFERS_BY_TIME_TABLE)?;
            let _ = write_txn.open_table(PENDING_OFFERS_BY_COURIER_TABLE)?;
            let _ = write_txn.open_table(IDEMPOTENCY_TABLE)?;
            let _ = write_txn.open_table(NOTIFICATION_QUEUE_TABLE)?;
            let _ = write_txn.open_table(NOTIFICATION_DEAD_LETTER_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> StorageResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }
}
