//! 健康检查路由
//!
//! # 路由列表
//!
//! | 路径 | 方法 | 说明 | 认证 |
//! |------|------|------|------|
//! | /api/health | GET | 健康检查 | 无 |
//!
//! # 响应示例
//!
//! ```json
//! {
//!   "status": "ok",
//!   "version": "0.1.0",
//!   "environment": "development",
//!   "connected_clients": 2,
//!   "pending_notifications": 0
//! }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;

/// 健康检查路由 - 公共路由 (无需认证)
pub fn router() -> Router<ServerState> {
    Router::new().route("/api/health", get(health))
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 状态 (ok | degraded)
    status: &'static str,
    version: &'static str,
    environment: String,
    /// 在线推送连接数
    connected_clients: usize,
    /// 待重投的离线通知
    #[serde(skip_serializing_if = "Option::is_none")]
    pending_notifications: Option<usize>,
}

/// GET /api/health
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let pending = match state.storage.pending_notification_count() {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not read notification queue");
            None
        }
    };

    Json(HealthResponse {
        status: if pending.is_some() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        connected_clients: state.connections.connected_count(),
        pending_notifications: pending,
    })
}
