//! Cart API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::error::ApiResponse;
use shared::models::{Actor, MAX_LINE_QUANTITY};
use shared::util::now_millis;
use validator::Validate;

use crate::api::require_user;
use crate::cart::{AddLine, CartView};
use crate::core::ServerState;
use crate::utils::validation::{MAX_SHORT_TEXT_LEN, validate_body};
use crate::utils::{AppResult, ok};

#[derive(Debug, Deserialize, Validate)]
pub struct AddLineRequest {
    #[validate(length(min = 1, max = 100))]
    pub product_id: String,
    #[validate(length(min = 1, max = 100))]
    pub variant_key: Option<String>,
    #[validate(range(min = 1, max = MAX_LINE_QUANTITY))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLineRequest {
    #[validate(range(min = 1, max = MAX_LINE_QUANTITY))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = MAX_SHORT_TEXT_LEN))]
    pub code: String,
}

/// GET /api/cart
pub async fn view(
    State(state): State<ServerState>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let user_id = require_user(&actor)?;
    let view = state.carts.view(user_id, now_millis()).await?;
    Ok(ok(view))
}

/// POST /api/cart/lines
pub async fn add_line(
    State(state): State<ServerState>,
    actor: Actor,
    Json(payload): Json<AddLineRequest>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let user_id = require_user(&actor)?;
    validate_body(&payload)?;
    let cmd = AddLine {
        product_id: payload.product_id,
        variant_key: payload.variant_key,
        quantity: payload.quantity,
    };
    let view = state.carts.add_line(user_id, cmd, now_millis()).await?;
    Ok(ok(view))
}

/// PUT /api/cart/lines/{line_id}
pub async fn update_line(
    State(state): State<ServerState>,
    actor: Actor,
    Path(line_id): Path<String>,
    Json(payload): Json<UpdateLineRequest>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let user_id = require_user(&actor)?;
    validate_body(&payload)?;
    let view = state
        .carts
        .update_line(user_id, &line_id, payload.quantity, now_millis())
        .await?;
    Ok(ok(view))
}

/// DELETE /api/cart/lines/{line_id}
pub async fn remove_line(
    State(state): State<ServerState>,
    actor: Actor,
    Path(line_id): Path<String>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let user_id = require_user(&actor)?;
    let view = state
        .carts
        .remove_line(user_id, &line_id, now_millis())
        .await?;
    Ok(ok(view))
}

/// DELETE /api/cart
pub async fn clear(
    State(state): State<ServerState>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let user_id = require_user(&actor)?;
    let view = state.carts.clear(user_id, now_millis()).await?;
    Ok(ok(view))
}

/// POST /api/cart/coupon
pub async fn apply_coupon(
    State(state): State<ServerState>,
    actor: Actor,
    Json(payload): Json<ApplyCouponRequest>,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let user_id = require_user(&actor)?;
    validate_body(&payload)?;
    let view = state
        .carts
        .apply_coupon(user_id, &payload.code, now_millis())
        .await?;
    Ok(ok(view))
}

/// DELETE /api/cart/coupon
pub async fn remove_coupon(
    State(state): State<ServerState>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<CartView>>> {
    let user_id = require_user(&actor)?;
    let view = state.carts.remove_coupon(user_id, now_millis()).await?;
    Ok(ok(view))
}
