//! Input validation helpers
//!
//! Text length limits shared by request DTOs, plus the bridge from
//! `validator` errors to [`AppError`].

use crate::utils::AppError;
use validator::Validate;

// ── Text length limits ──────────────────────────────────────────────

/// Notes, cancellation reasons
pub const MAX_NOTE_LEN: u64 = 500;

/// Short identifiers: phone, postal code, coupon code, idempotency key
pub const MAX_SHORT_TEXT_LEN: u64 = 100;

/// Address lines
pub const MAX_ADDRESS_LEN: u64 = 500;

/// Validate a request body, mapping failures to `ValidationFailed`
pub fn validate_body<T: Validate>(body: &T) -> Result<(), AppError> {
    body.validate()
        .map_err(|e| AppError::validation(e.to_string().replace('\n', "; ")))
}
