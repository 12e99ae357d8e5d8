//! Cart endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::auth::AuthUser;
use crate::core_types::CartId;
use crate::gateway::response::{codes, ok, ApiError, ApiResult};
use crate::gateway::state::AppState;
use crate::models::CartItem;
use crate::persistence::PersistError;

#[derive(Debug, Deserialize, Validate)]
pub struct AddCartRequest {
    pub commodity_id: i64,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartRequest {
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i64,
}

pub async fn add_item(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<AddCartRequest>,
) -> ApiResult<CartItem> {
    if let Err(errors) = req.validate() {
        return ApiError::bad_request(errors.to_string()).into_err();
    }
    match state
        .carts
        .add_item(user.user_id, req.commodity_id, req.quantity)
        .await
    {
        Ok(item) => ok(item),
        Err(err) => ApiError::from(err).into_err(),
    }
}

pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CartId>,
    Json(req): Json<UpdateCartRequest>,
) -> ApiResult<()> {
    if let Err(errors) = req.validate() {
        return ApiError::bad_request(errors.to_string()).into_err();
    }
    match state.carts.update_quantity(id, req.quantity).await {
        Ok(()) => ok(()),
        Err(PersistError::NotFound) => {
            ApiError::not_found(codes::NOT_FOUND, "cart item not found").into_err()
        }
        Err(err) => ApiError::from(err).into_err(),
    }
}

pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<CartId>,
) -> ApiResult<()> {
    match state.carts.remove_item(id, user.user_id).await {
        Ok(()) => ok(()),
        Err(PersistError::NotFound) => {
            ApiError::not_found(codes::NOT_FOUND, "cart item not found").into_err()
        }
        Err(err) => ApiError::from(err).into_err(),
    }
}

pub async fn list_mine(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<CartItem>> {
    match state.carts.list_by_user(user.user_id).await {
        Ok(items) => ok(items),
        Err(err) => ApiError::from(err).into_err(),
    }
}
