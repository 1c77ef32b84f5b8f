//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Success
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::OrderNotFound
            | Self::ProductNotFound
            | Self::CouponNotFound
            | Self::CartLineNotFound
            | Self::OfferNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict (lost races and state conflicts, caller may retry from scratch)
            Self::AlreadyExists
            | Self::CouponCodeExists
            | Self::InvalidTransition
            | Self::OrderAlreadyTerminal
            | Self::InsufficientInventory
            | Self::CouponUsageExhausted
            | Self::CartChanged
            | Self::OfferClosed
            | Self::OrderAlreadyAssigned
            | Self::PaymentAlreadySettled => StatusCode::CONFLICT,

            // 401 Unauthorized
            Self::NotAuthenticated | Self::TokenExpired | Self::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }

            // 403 Forbidden
            Self::PermissionDenied | Self::RoleRequired | Self::AdminRequired => {
                StatusCode::FORBIDDEN
            }

            // 422 Unprocessable (availability and "nothing to order" outcomes)
            Self::ProductUnavailable
            | Self::NoAvailableItems
            | Self::CartEmpty
            | Self::CartAdjusted
            | Self::CouponInvalid => StatusCode::UNPROCESSABLE_ENTITY,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::SystemBusy | Self::CatalogUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::InternalError
            | Self::DatabaseError
            | Self::ConfigError
            | Self::StorageFull
            | Self::StorageCorrupted
            | Self::OrderNumberAllocationFailed => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (default for validation errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_status() {
        assert_eq!(ErrorCode::OrderNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::OfferNotFound.http_status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_concurrency_failures_are_conflicts() {
        assert_eq!(
            ErrorCode::InsufficientInventory.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::CouponUsageExhausted.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ErrorCode::CartChanged.http_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_nothing_to_order_is_unprocessable() {
        assert_eq!(
            ErrorCode::CartEmpty.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorCode::NoAvailableItems.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_validation_defaults_to_bad_request() {
        assert_eq!(
            ErrorCode::ValidationFailed.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ErrorCode::UnknownVariant.http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_allocation_failure_is_internal() {
        assert_eq!(
            ErrorCode::OrderNumberAllocationFailed.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
