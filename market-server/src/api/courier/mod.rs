//! Courier API Module
//!
//! 配送邀请的查询与响应，以及 WebSocket 实时推送通道。

mod handler;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Courier router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/courier", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/offers", get(handler::list_offers))
        .route("/offers/{order_id}/accept", post(handler::accept))
        .route("/offers/{order_id}/reject", post(handler::reject))
        .route("/ws", get(ws::handle_push_ws))
}
