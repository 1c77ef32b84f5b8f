//! Shared types for the marketplace checkout engine
//!
//! Types used by the server and by any client talking to it: the unified
//! error system, actor identity, cart/order/coupon/courier models and the
//! real-time push payloads.

pub mod error;
pub mod message;
pub mod models;
pub mod order;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
pub use message::{PushMessage, PushPayload};
pub use models::Actor;
