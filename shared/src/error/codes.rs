//! Unified error codes for the marketplace engine
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 4xxx: Order errors
//! - 5xxx: Payment errors
//! - 6xxx: Product and coupon errors
//! - 7xxx: Cart errors
//! - 8xxx: Courier errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Auth ====================
    /// Caller is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Specific role required
    RoleRequired = 2002,
    /// Admin role required
    AdminRequired = 2003,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Status transition not allowed
    InvalidTransition = 4002,
    /// Could not allocate a unique order number
    OrderNumberAllocationFailed = 4003,
    /// Nothing left to order after reconciliation
    NoAvailableItems = 4004,
    /// Order is in a terminal state
    OrderAlreadyTerminal = 4005,
    /// Cart changed during reconciliation and the caller asked to re-confirm
    CartAdjusted = 4006,

    // ==================== 5xxx: Payment ====================
    /// Payment processing failed
    PaymentFailed = 5001,
    /// Invalid payment method
    PaymentInvalidMethod = 5003,
    /// Payment already settled
    PaymentAlreadySettled = 5004,

    // ==================== 6xxx: Product / Coupon ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Product is inactive, unapproved, or its vendor is inactive
    ProductUnavailable = 6002,
    /// Not enough stock for the requested quantity
    InsufficientInventory = 6003,
    /// Variant key does not exist for the product
    UnknownVariant = 6004,
    /// Coupon not found
    CouponNotFound = 6501,
    /// Coupon does not apply to this cart
    CouponInvalid = 6502,
    /// Coupon usage limit reached
    CouponUsageExhausted = 6503,
    /// Coupon code already exists
    CouponCodeExists = 6504,

    // ==================== 7xxx: Cart ====================
    /// Cart has no lines
    CartEmpty = 7001,
    /// Cart line not found
    CartLineNotFound = 7002,
    /// Cart changed concurrently
    CartChanged = 7003,

    // ==================== 8xxx: Courier ====================
    /// Assignment offer not found
    OfferNotFound = 8001,
    /// Assignment offer is no longer pending
    OfferClosed = 8002,
    /// Order already has a courier
    OrderAlreadyAssigned = 8003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Configuration error
    ConfigError = 9005,
    /// Storage full (disk space insufficient)
    StorageFull = 9401,
    /// Storage corrupted (data file damaged)
    StorageCorrupted = 9403,
    /// System busy (IO error, retry later)
    SystemBusy = 9404,
    /// Catalog store unavailable
    CatalogUnavailable = 9501,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "Caller is not authenticated",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::TokenInvalid => "Authentication token is invalid",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::RoleRequired => "Specific role is required",
            ErrorCode::AdminRequired => "Administrator role is required",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::InvalidTransition => "Order status transition is not allowed",
            ErrorCode::OrderNumberAllocationFailed => "Could not allocate an order number",
            ErrorCode::NoAvailableItems => "Nothing to order: no cart item is available",
            ErrorCode::OrderAlreadyTerminal => "Order is already closed",
            ErrorCode::CartAdjusted => "Cart was adjusted, please review before ordering",

            // Payment
            ErrorCode::PaymentFailed => "Payment processing failed",
            ErrorCode::PaymentInvalidMethod => "Invalid payment method",
            ErrorCode::PaymentAlreadySettled => "Payment has already been settled",

            // Product / Coupon
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::ProductUnavailable => "Product is not available",
            ErrorCode::InsufficientInventory => "Insufficient inventory",
            ErrorCode::UnknownVariant => "Unknown product variant",
            ErrorCode::CouponNotFound => "Coupon not found",
            ErrorCode::CouponInvalid => "Coupon is not applicable",
            ErrorCode::CouponUsageExhausted => "Coupon usage limit reached",
            ErrorCode::CouponCodeExists => "Coupon code already exists",

            // Cart
            ErrorCode::CartEmpty => "Cart is empty",
            ErrorCode::CartLineNotFound => "Cart line not found",
            ErrorCode::CartChanged => "Cart changed, please retry",

            // Courier
            ErrorCode::OfferNotFound => "Assignment offer not found",
            ErrorCode::OfferClosed => "Assignment offer is no longer pending",
            ErrorCode::OrderAlreadyAssigned => "Order already has a courier",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::StorageFull => "Storage full (disk space insufficient)",
            ErrorCode::StorageCorrupted => "Storage corrupted (data file damaged)",
            ErrorCode::SystemBusy => "System busy, please retry later",
            ErrorCode::CatalogUnavailable => "Catalog is temporarily unavailable",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::RoleRequired),
            2003 => Ok(ErrorCode::AdminRequired),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::InvalidTransition),
            4003 => Ok(ErrorCode::OrderNumberAllocationFailed),
            4004 => Ok(ErrorCode::NoAvailableItems),
            4005 => Ok(ErrorCode::OrderAlreadyTerminal),
            4006 => Ok(ErrorCode::CartAdjusted),

            // Payment
            5001 => Ok(ErrorCode::PaymentFailed),
            5003 => Ok(ErrorCode::PaymentInvalidMethod),
            5004 => Ok(ErrorCode::PaymentAlreadySettled),

            // Product / Coupon
            6001 => Ok(ErrorCode::ProductNotFound),
            6002 => Ok(ErrorCode::ProductUnavailable),
            6003 => Ok(ErrorCode::InsufficientInventory),
            6004 => Ok(ErrorCode::UnknownVariant),
            6501 => Ok(ErrorCode::CouponNotFound),
            6502 => Ok(ErrorCode::CouponInvalid),
            6503 => Ok(ErrorCode::CouponUsageExhausted),
            6504 => Ok(ErrorCode::CouponCodeExists),

            // Cart
            7001 => Ok(ErrorCode::CartEmpty),
            7002 => Ok(ErrorCode::CartLineNotFound),
            7003 => Ok(ErrorCode::CartChanged),

            // Courier
            8001 => Ok(ErrorCode::OfferNotFound),
            8002 => Ok(ErrorCode::OfferClosed),
            8003 => Ok(ErrorCode::OrderAlreadyAssigned),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9005 => Ok(ErrorCode::ConfigError),
            9401 => Ok(ErrorCode::StorageFull),
            9403 => Ok(ErrorCode::StorageCorrupted),
            9404 => Ok(ErrorCode::SystemBusy),
            9501 => Ok(ErrorCode::CatalogUnavailable),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
