//! 工具模块 - 通用工具函数和类型
//!
//! # 内容
//!
//! - [`AppError`] - 应用错误类型 (from shared::error)
//! - [`ApiResponse`] - API 响应结构 (from shared::error)
//! - 日志、业务时区、输入校验

pub mod error;
pub mod logger;
pub mod time;
pub mod validation;

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
pub use error::{ok, ok_with_message};
