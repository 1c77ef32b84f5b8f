//! Errors raised by the cart store, the commit pipeline, the lifecycle state
//! machine and offer handling

use crate::catalog::CatalogError;
use crate::pricing::{RejectReason, RemovedLine};
use crate::storage::StorageError;
use shared::error::{AppError, ErrorCode};
use shared::models::OfferStatus;
use shared::order::OrderStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    // ========== Validation ==========
    #[error("Validation failed: {0}")]
    Validation(String),

    // ========== Availability ==========
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product {product_id} is not available")]
    ProductUnavailable { product_id: String },

    #[error("Insufficient inventory for product {product_id}")]
    InsufficientInventory { product_id: String },

    // ========== Cart ==========
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Nothing to order: every cart line is unavailable")]
    NoAvailableItems { removed: Vec<RemovedLine> },

    #[error("Cart was adjusted during checkout")]
    CartAdjusted { removed: Vec<RemovedLine> },

    #[error("Cart changed during checkout")]
    CartChanged,

    #[error("Cart line not found: {0}")]
    CartLineNotFound(String),

    // ========== Coupon ==========
    #[error("Coupon not found: {0}")]
    CouponNotFound(String),

    #[error("Coupon not applicable: {0}")]
    CouponInvalid(RejectReason),

    #[error("Coupon usage exhausted: {0}")]
    CouponExhausted(String),

    #[error("Coupon code already exists: {0}")]
    CouponCodeExists(String),

    // ========== Order ==========
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Transition {from} -> {to} is not allowed")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order is already {0}")]
    OrderAlreadyTerminal(OrderStatus),

    #[error("Could not allocate an order number after {attempts} attempts")]
    OrderNumberAllocationFailed { attempts: u32 },

    #[error("Payment already settled")]
    PaymentAlreadySettled,

    // ========== Authorization ==========
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // ========== Courier ==========
    #[error("Assignment offer not found")]
    OfferNotFound,

    #[error("Assignment offer is {0:?}")]
    OfferClosed(OfferStatus),

    #[error("Order is not ready for pickup (status {0})")]
    OrderNotReady(OrderStatus),

    #[error("Order already has a courier")]
    OrderAlreadyAssigned,
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;

/// 将存储错误转换为错误码
fn classify_storage_error(e: &StorageError) -> ErrorCode {
    if let StorageError::Serialization(_) = e {
        return ErrorCode::InternalError;
    }

    // redb 错误通过字符串匹配分类
    let err_str = e.to_string().to_lowercase();

    // 磁盘空间不足
    if err_str.contains("no space") || err_str.contains("disk full") || err_str.contains("enospc")
    {
        return ErrorCode::StorageFull;
    }

    // 数据损坏
    if err_str.contains("corrupt") || err_str.contains("invalid database") {
        return ErrorCode::StorageCorrupted;
    }

    // 默认：系统繁忙
    ErrorCode::SystemBusy
}

fn removed_detail(removed: &[RemovedLine]) -> serde_json::Value {
    serde_json::to_value(removed).unwrap_or_default()
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        let message = err.to_string();
        match err {
            CheckoutError::Storage(e) => {
                let code = classify_storage_error(&e);
                tracing::error!(error = %e, error_code = ?code, "Storage error occurred");
                AppError::with_message(code, message)
            }
            CheckoutError::Catalog(e) => match e {
                CatalogError::ProductNotFound(id) => {
                    AppError::with_message(ErrorCode::ProductNotFound, message)
                        .with_detail("product_id", id)
                }
                CatalogError::UnknownVariant { .. } | CatalogError::VariantRequired(_) => {
                    AppError::with_message(ErrorCode::UnknownVariant, message)
                }
                CatalogError::Unavailable(_) => {
                    tracing::warn!(error = %e, "Catalog unavailable");
                    AppError::with_message(ErrorCode::CatalogUnavailable, message)
                }
                CatalogError::Seed(_) => {
                    tracing::error!(error = %e, "Catalog seed error");
                    AppError::internal(message)
                }
            },
            CheckoutError::Validation(msg) => AppError::validation(msg),
            CheckoutError::ProductNotFound(id) => {
                AppError::with_message(ErrorCode::ProductNotFound, message)
                    .with_detail("product_id", id)
            }
            CheckoutError::ProductUnavailable { product_id } => {
                AppError::with_message(ErrorCode::ProductUnavailable, message)
                    .with_detail("product_id", product_id)
            }
            CheckoutError::InsufficientInventory { product_id } => {
                AppError::with_message(ErrorCode::InsufficientInventory, message)
                    .with_detail("product_id", product_id)
            }
            CheckoutError::EmptyCart => AppError::new(ErrorCode::CartEmpty),
            CheckoutError::NoAvailableItems { removed } => {
                AppError::new(ErrorCode::NoAvailableItems)
                    .with_detail("removed", removed_detail(&removed))
            }
            CheckoutError::CartAdjusted { removed } => AppError::new(ErrorCode::CartAdjusted)
                .with_detail("removed", removed_detail(&removed)),
            CheckoutError::CartChanged => AppError::new(ErrorCode::CartChanged),
            CheckoutError::CartLineNotFound(id) => {
                AppError::with_message(ErrorCode::CartLineNotFound, message)
                    .with_detail("line_id", id)
            }
            CheckoutError::CouponNotFound(code) => {
                AppError::with_message(ErrorCode::CouponNotFound, message).with_detail("code", code)
            }
            CheckoutError::CouponInvalid(reason) => {
                let detail = serde_json::to_value(&reason).unwrap_or_default();
                AppError::with_message(ErrorCode::CouponInvalid, message).with_detail("reason", detail)
            }
            CheckoutError::CouponExhausted(_) => {
                AppError::with_message(ErrorCode::CouponUsageExhausted, message)
            }
            CheckoutError::CouponCodeExists(_) => {
                AppError::with_message(ErrorCode::CouponCodeExists, message)
            }
            CheckoutError::OrderNotFound(id) => {
                AppError::with_message(ErrorCode::OrderNotFound, message).with_detail("order_id", id)
            }
            CheckoutError::InvalidTransition { from, to } => {
                AppError::with_message(ErrorCode::InvalidTransition, message)
                    .with_detail("from", from.as_str())
                    .with_detail("to", to.as_str())
            }
            CheckoutError::OrderAlreadyTerminal(_) => {
                AppError::with_message(ErrorCode::OrderAlreadyTerminal, message)
            }
            CheckoutError::OrderNumberAllocationFailed { .. } => {
                AppError::with_message(ErrorCode::OrderNumberAllocationFailed, message)
            }
            CheckoutError::PaymentAlreadySettled => AppError::new(ErrorCode::PaymentAlreadySettled),
            CheckoutError::PermissionDenied(msg) => AppError::forbidden(msg),
            CheckoutError::OfferNotFound => AppError::new(ErrorCode::OfferNotFound),
            CheckoutError::OfferClosed(_) => AppError::with_message(ErrorCode::OfferClosed, message),
            CheckoutError::OrderNotReady(_) => {
                AppError::with_message(ErrorCode::InvalidTransition, message)
            }
            CheckoutError::OrderAlreadyAssigned => AppError::new(ErrorCode::OrderAlreadyAssigned),
        }
    }
}
