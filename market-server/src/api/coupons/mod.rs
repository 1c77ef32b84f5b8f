//! Coupon API Module
//!
//! 商家为自己发放优惠券，平台管理员发放平台券。

mod handler;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::core::ServerState;

/// Coupon router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/coupons", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::create))
        .route("/code/{code}", get(handler::get_by_code))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/active", put(handler::set_active))
}
