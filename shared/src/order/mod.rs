//! Order Module
//!
//! - Types: status, payment and address enums/records
//! - Snapshot: the frozen order record produced by checkout

pub mod snapshot;
pub mod types;

// Re-exports
pub use snapshot::{CouponApplication, CouponEffect, Order, OrderLine, PricingBreakdown};
pub use types::*;
