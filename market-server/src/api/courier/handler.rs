//! Courier API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use shared::error::ApiResponse;
use shared::models::{Actor, AssignmentOffer};
use shared::order::Order;
use shared::util::now_millis;

use crate::core::ServerState;
use crate::utils::{AppError, AppResult, ok};

fn require_courier(actor: &Actor) -> AppResult<&str> {
    actor
        .courier_id()
        .ok_or_else(|| AppError::forbidden("Courier role is required"))
}

/// GET /api/courier/offers - pending offers of the caller
pub async fn list_offers(
    State(state): State<ServerState>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<Vec<AssignmentOffer>>>> {
    let courier_id = require_courier(&actor)?;
    let offers = state.broadcaster.pending_offers(courier_id)?;
    Ok(ok(offers))
}

/// POST /api/courier/offers/{order_id}/accept
pub async fn accept(
    State(state): State<ServerState>,
    actor: Actor,
    Path(order_id): Path<String>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let courier_id = require_courier(&actor)?;
    let order = state
        .broadcaster
        .accept(&order_id, courier_id, now_millis())
        .await?;
    Ok(ok(order))
}

/// POST /api/courier/offers/{order_id}/reject
pub async fn reject(
    State(state): State<ServerState>,
    actor: Actor,
    Path(order_id): Path<String>,
) -> AppResult<Json<ApiResponse<AssignmentOffer>>> {
    let courier_id = require_courier(&actor)?;
    let offer = state
        .broadcaster
        .reject(&order_id, courier_id, now_millis())
        .await?;
    Ok(ok(offer))
}
