//! 统一错误处理
//!
//! 错误类型统一来自 `shared::error`，这里只补充 handler 常用的响应构造函数。
//!
//! # 使用示例
//!
//! ```ignore
//! // 返回错误
//! Err(AppError::not_found("Order"))
//!
//! // 返回成功响应
//! Ok(ok(order))
//! ```

use axum::Json;
use serde::Serialize;

pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

/// Create a successful response
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

/// Create a successful response with custom message
pub fn ok_with_message<T: Serialize>(data: T, message: impl Into<String>) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success_with_message(message, data))
}
