//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`cart`] - 购物车
//! - [`orders`] - 下单与订单状态
//! - [`coupons`] - 优惠券发放
//! - [`courier`] - 配送邀请与实时推送

pub mod cart;
pub mod coupons;
pub mod courier;
pub mod health;
pub mod orders;

// Re-export common types for handlers
pub use crate::utils::{AppError, AppResult};

use crate::core::ServerState;
use axum::{Router, middleware};
use shared::models::Actor;
use tower::ServiceBuilder;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

/// 同时处理的请求上限
const MAX_IN_FLIGHT_REQUESTS: usize = 512;

/// HTTP 请求日志中间件
async fn log_request(
    request: http::Request<axum::body::Body>,
    next: middleware::Next,
) -> http::Response<axum::body::Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let status = response.status();

    tracing::info!(target: "http_access", "{} {} {}", method, uri, status);

    response
}

/// Build the Axum router (without state)
pub fn routes() -> Router<ServerState> {
    Router::<ServerState>::new()
        .merge(health::router())
        .merge(cart::router())
        .merge(orders::router())
        .merge(coupons::router())
        .merge(courier::router())
}

/// Build the full application with state and tower layers
pub fn build_app(state: ServerState) -> Router {
    routes().with_state(state).layer(
        ServiceBuilder::new()
            // HTTP 请求日志中间件
            .layer(middleware::from_fn(log_request))
            .layer(GlobalConcurrencyLimitLayer::new(MAX_IN_FLIGHT_REQUESTS))
            // Tower HTTP 中间件
            .layer(CorsLayer::permissive())
            .layer(CompressionLayer::new()),
    )
}

/// 购物车只属于终端用户
pub(crate) fn require_user(actor: &Actor) -> AppResult<&str> {
    actor
        .user_id()
        .ok_or_else(|| AppError::forbidden(format!("{} has no cart", actor)))
}
