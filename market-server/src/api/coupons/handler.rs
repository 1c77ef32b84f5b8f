//! Coupon API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use shared::error::ApiResponse;
use shared::models::{Actor, Coupon, CouponCreate};
use shared::util::now_millis;

use crate::core::ServerState;
use crate::utils::validation::MAX_SHORT_TEXT_LEN;
use crate::utils::{AppError, AppResult, ok, ok_with_message};

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
    pub is_active: bool,
}

/// POST /api/coupons
pub async fn create(
    State(state): State<ServerState>,
    actor: Actor,
    Json(payload): Json<CouponCreate>,
) -> AppResult<Json<ApiResponse<Coupon>>> {
    if payload.code.len() as u64 > MAX_SHORT_TEXT_LEN {
        return Err(AppError::validation(format!(
            "code is too long (max {MAX_SHORT_TEXT_LEN})"
        )));
    }
    let coupon = state.coupons.create(&actor, payload, now_millis())?;
    Ok(ok_with_message(coupon, "Coupon created"))
}

/// GET /api/coupons/code/{code}
pub async fn get_by_code(
    State(state): State<ServerState>,
    _actor: Actor,
    Path(code): Path<String>,
) -> AppResult<Json<ApiResponse<Coupon>>> {
    let coupon = state.coupons.find_by_code(&code)?;
    Ok(ok(coupon))
}

/// GET /api/coupons/{id}
pub async fn get_by_id(
    State(state): State<ServerState>,
    _actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Coupon>>> {
    let coupon = state.coupons.get(&id)?;
    Ok(ok(coupon))
}

/// PUT /api/coupons/{id}/active
pub async fn set_active(
    State(state): State<ServerState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(payload): Json<ActiveBody>,
) -> AppResult<Json<ApiResponse<Coupon>>> {
    let coupon = state.coupons.set_active(&actor, &id, payload.is_active)?;
    Ok(ok(coupon))
}
