//! Cart API Module
//!
//! 仅终端用户可访问；每次读取都会经过对账并剔除不可售的行。

mod handler;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::core::ServerState;

/// Cart router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/cart", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::view).delete(handler::clear))
        .route("/lines", post(handler::add_line))
        .route(
            "/lines/{line_id}",
            put(handler::update_line).delete(handler::remove_line),
        )
        .route(
            "/coupon",
            post(handler::apply_coupon).delete(handler::remove_coupon),
        )
}
