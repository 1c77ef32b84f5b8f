//! Data models
//!
//! Shared between the server and clients (via API). Identifiers of users,
//! vendors, couriers and products come from external systems and are opaque
//! strings; money is `rust_decimal::Decimal`; timestamps are Unix millis.

pub mod actor;
pub mod cart;
pub mod coupon;
pub mod courier;
pub mod product;

// Re-exports
pub use actor::*;
pub use cart::*;
pub use coupon::*;
pub use courier::*;
pub use product::*;
