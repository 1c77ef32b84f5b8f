//! Courier assignment
//!
//! - **channel**: presence-aware push seam and the in-process connection registry
//! - **broadcaster**: offers for ready orders, acceptance, rejection, expiry

pub mod broadcaster;
pub mod channel;

pub use broadcaster::{BroadcastReport, CourierBroadcaster, Notified};
pub use channel::{ConnectionRegistry, DeliveryStatus, PushChannel, PushError};
