//! Order API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use shared::error::ApiResponse;
use shared::models::{Actor, AssignmentOffer};
use shared::order::{Order, OrderStatus, PaymentMethod, ShippingAddress};
use shared::util::now_millis;
use validator::Validate;

use crate::api::require_user;
use crate::core::ServerState;
use crate::orders::{CheckoutOutcome, CheckoutRequest, allowed_transitions};
use crate::utils::validation::{MAX_ADDRESS_LEN, MAX_NOTE_LEN, MAX_SHORT_TEXT_LEN, validate_body};
use crate::utils::{AppError, AppResult, ok};

/// Header carrying the client idempotency key
const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Debug, Deserialize, Validate)]
pub struct AddressBody {
    #[validate(length(min = 1, max = MAX_SHORT_TEXT_LEN))]
    pub recipient: String,
    #[validate(length(min = 1, max = MAX_SHORT_TEXT_LEN))]
    pub phone: String,
    #[validate(length(min = 1, max = MAX_ADDRESS_LEN))]
    pub line1: String,
    #[validate(length(max = MAX_ADDRESS_LEN))]
    pub line2: Option<String>,
    #[validate(length(min = 1, max = MAX_SHORT_TEXT_LEN))]
    pub city: String,
    #[validate(length(max = MAX_SHORT_TEXT_LEN))]
    pub postal_code: Option<String>,
}

impl From<AddressBody> for ShippingAddress {
    fn from(body: AddressBody) -> Self {
        Self {
            recipient: body.recipient.trim().to_string(),
            phone: body.phone.trim().to_string(),
            line1: body.line1.trim().to_string(),
            line2: body.line2,
            city: body.city.trim().to_string(),
            postal_code: body.postal_code,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutBody {
    #[validate(nested)]
    pub shipping_address: AddressBody,
    pub payment_method: PaymentMethod,
    #[validate(length(max = MAX_NOTE_LEN))]
    pub notes: Option<String>,
    /// Abort instead of proceeding when unavailable lines were removed
    #[serde(default)]
    pub require_unchanged: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusBody {
    pub status: OrderStatus,
    #[validate(length(max = MAX_NOTE_LEN))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelBody {
    #[validate(length(max = MAX_NOTE_LEN))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentBody {
    pub success: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NotesBody {
    #[validate(length(max = MAX_NOTE_LEN))]
    pub notes: Option<String>,
}

/// Statuses the caller may move an order to
#[derive(Debug, Serialize)]
pub struct TransitionsResponse {
    pub current: OrderStatus,
    pub allowed: Vec<OrderStatus>,
}

fn idempotency_key(headers: &HeaderMap) -> AppResult<Option<String>> {
    let Some(value) = headers.get(IDEMPOTENCY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| AppError::validation("Idempotency-Key must be visible ASCII"))?
        .trim();
    if key.is_empty() || key.len() as u64 > MAX_SHORT_TEXT_LEN {
        return Err(AppError::validation(format!(
            "Idempotency-Key must be 1..={} chars",
            MAX_SHORT_TEXT_LEN
        )));
    }
    Ok(Some(key.to_string()))
}

/// POST /api/orders - commit the caller's cart
pub async fn checkout(
    State(state): State<ServerState>,
    actor: Actor,
    headers: HeaderMap,
    Json(payload): Json<CheckoutBody>,
) -> AppResult<Json<ApiResponse<CheckoutOutcome>>> {
    let user_id = require_user(&actor)?;
    validate_body(&payload)?;

    let request = CheckoutRequest {
        shipping_address: payload.shipping_address.into(),
        payment_method: payload.payment_method,
        notes: payload.notes,
        idempotency_key: idempotency_key(&headers)?,
        require_unchanged: payload.require_unchanged,
    };
    let outcome = state
        .checkout
        .commit(user_id, request, now_millis())
        .await?;
    Ok(ok(outcome))
}

/// GET /api/orders
pub async fn list_orders(
    State(state): State<ServerState>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<Vec<Order>>>> {
    let orders = state.lifecycle.list_orders(&actor)?;
    Ok(ok(orders))
}

/// GET /api/vendor/orders
pub async fn list_vendor_orders(
    State(state): State<ServerState>,
    actor: Actor,
) -> AppResult<Json<ApiResponse<Vec<Order>>>> {
    if actor.vendor_id().is_none() {
        return Err(AppError::forbidden("Vendor role is required"));
    }
    let orders = state.lifecycle.list_orders(&actor)?;
    Ok(ok(orders))
}

/// GET /api/orders/{id}
pub async fn get_by_id(
    State(state): State<ServerState>,
    actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order = state.lifecycle.get_order(&id, &actor)?;
    Ok(ok(order))
}

/// GET /api/orders/{id}/transitions
pub async fn transitions(
    State(state): State<ServerState>,
    actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<TransitionsResponse>>> {
    let order = state.lifecycle.get_order(&id, &actor)?;
    Ok(ok(TransitionsResponse {
        current: order.status,
        allowed: allowed_transitions(&order, &actor),
    }))
}

/// GET /api/orders/{id}/offers - vendor or admin view of courier offers
pub async fn list_offers(
    State(state): State<ServerState>,
    actor: Actor,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<AssignmentOffer>>>> {
    let order = state.lifecycle.get_order(&id, &actor)?;
    let is_vendor = actor.vendor_id().is_some_and(|v| order.has_vendor(v));
    if !is_vendor && !actor.is_privileged() {
        return Err(AppError::forbidden("Only vendors on the order may list its offers"));
    }
    let offers = state.broadcaster.offers_for_order(&order.id)?;
    Ok(ok(offers))
}

/// PATCH /api/orders/{id}/status
pub async fn update_status(
    State(state): State<ServerState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(payload): Json<StatusBody>,
) -> AppResult<Json<ApiResponse<Order>>> {
    validate_body(&payload)?;
    let order = state
        .lifecycle
        .transition(&id, payload.status, &actor, payload.note, now_millis())
        .await?;
    Ok(ok(order))
}

/// POST /api/orders/{id}/cancel
pub async fn cancel(
    State(state): State<ServerState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(payload): Json<CancelBody>,
) -> AppResult<Json<ApiResponse<Order>>> {
    validate_body(&payload)?;
    let order = state
        .lifecycle
        .cancel(&id, &actor, payload.reason, now_millis())
        .await?;
    Ok(ok(order))
}

/// POST /api/orders/{id}/payment - payment callback
pub async fn settle_payment(
    State(state): State<ServerState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(payload): Json<PaymentBody>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let order = state
        .lifecycle
        .settle_payment(&id, payload.success, &actor, now_millis())?;
    Ok(ok(order))
}

/// PATCH /api/orders/{id}/notes
pub async fn update_notes(
    State(state): State<ServerState>,
    actor: Actor,
    Path(id): Path<String>,
    Json(payload): Json<NotesBody>,
) -> AppResult<Json<ApiResponse<Order>>> {
    validate_body(&payload)?;
    let order = state
        .lifecycle
        .set_notes(&id, &actor, payload.notes, now_millis())?;
    Ok(ok(order))
}
