//! 认证模块
//!
//! 身份由外部签发的 JWT 解析，核心只信任解析结果并自行做归属校验：
//! - [`JwtService`] - JWT 令牌服务
//! - [`Actor`](shared::models::Actor) 提取器 - 见 [`extractor`]

pub mod extractor;
pub mod jwt;

pub use jwt::{Claims, JwtConfig, JwtError, JwtService};
