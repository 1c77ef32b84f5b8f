//! Order API Module
//!
//! 下单、查询与状态流转。归属校验在 [`OrderLifecycle`](crate::orders::OrderLifecycle) 内完成。

mod handler;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new()
        .nest("/api/orders", routes())
        .route("/api/vendor/orders", get(handler::list_vendor_orders))
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::checkout).get(handler::list_orders))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/transitions", get(handler::transitions))
        .route("/{id}/offers", get(handler::list_offers))
        .route("/{id}/status", patch(handler::update_status))
        .route("/{id}/cancel", post(handler::cancel))
        .route("/{id}/payment", post(handler::settle_payment))
        .route("/{id}/notes", patch(handler::update_notes))
}
