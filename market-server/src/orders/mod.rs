//! Orders
//!
//! - **commit**: cart → immutable order (debit, number allocation, persistence)
//! - **lifecycle**: status state machine with actor rules and side effects
//! - **number**: human-readable order number candidates
//! - **error**: the checkout error taxonomy and its `AppError` mapping
//!
//! # Data Flow
//!
//! ```text
//! CartStore ─▶ PricingReconciler ─▶ CommitPipeline ─▶ Order (redb)
//!                                                      │
//!                        OrderLifecycle ◀──────────────┘
//!                             │ → ready
//!                             ▼
//!                     CourierBroadcaster
//! ```

pub mod commit;
pub mod error;
pub mod lifecycle;
pub mod number;

// Re-exports
pub use commit::{CheckoutOutcome, CheckoutRequest, CommitPipeline};
pub use error::{CheckoutError, CheckoutResult};
pub use lifecycle::{OrderLifecycle, allowed_transitions, can_view, legal_successors};
pub use number::{OrderNumberSource, RandomOrderNumbers};
