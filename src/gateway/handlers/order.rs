//! Order endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::auth::AuthUser;
use crate::core_types::OrderId;
use crate::gateway::response::{codes, ok, ApiError, ApiResult};
use crate::gateway::state::AppState;
use crate::models::Order;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub commodity_id: i64,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i64,
    pub total_price: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderRequest {
    pub status: Option<String>,
    pub address: Option<String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Order> {
    if let Err(errors) = req.validate() {
        return ApiError::new(
            axum::http::StatusCode::BAD_REQUEST,
            codes::INVALID_PARAMS,
            errors.to_string(),
        )
        .into_err();
    }

    match state
        .coordinator
        .create_order(
            user.user_id,
            req.commodity_id,
            req.quantity,
            req.total_price,
            req.address,
        )
        .await
    {
        Ok(order) => {
            tracing::info!(order_id = order.id, user_id = user.user_id, "order create success");
            ok(order)
        }
        Err(err) => ApiError::from(err).into_err(),
    }
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
    Json(req): Json<UpdateOrderRequest>,
) -> ApiResult<()> {
    if let Some(status) = req.status.as_deref().filter(|s| !s.is_empty()) {
        if let Err(err) = state.coordinator.update_status(id, status).await {
            return ApiError::from(err).into_err();
        }
    }
    if let Some(address) = req.address.as_deref().filter(|a| !a.is_empty()) {
        if let Err(err) = state.coordinator.update_address(id, address).await {
            return ApiError::from(err).into_err();
        }
    }
    ok(())
}

pub async fn remove(State(state): State<Arc<AppState>>, Path(id): Path<OrderId>) -> ApiResult<()> {
    match state.coordinator.delete(id).await {
        Ok(()) => ok(()),
        Err(err) => ApiError::from(err).into_err(),
    }
}

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OrderId>,
) -> ApiResult<Order> {
    match state.coordinator.get(id).await {
        Ok(order) => ok(order),
        Err(err) => ApiError::from(err).into_err(),
    }
}

pub async fn list_mine(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<Order>> {
    match state.coordinator.list_by_user(user.user_id).await {
        Ok(orders) => ok(orders),
        Err(err) => ApiError::from(err).into_err(),
    }
}
