//! Pricing
//!
//! - `discount`: pure coupon evaluation
//! - `reconciler`: re-derives line prices and availability from the catalog
//!   and computes the price breakdown
//! - `money`: rounding helpers shared by both

pub mod discount;
pub mod money;
mod reconciler;

pub use discount::{DiscountContext, DiscountOutcome, RejectReason, evaluate};
pub use reconciler::{
    PricedLine, PricingReconciler, Reconciliation, RemovalReason, RemovedLine, compute_breakdown,
};
