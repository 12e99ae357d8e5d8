//! Request handlers, one module per resource.

pub mod cart;
pub mod commodity;
pub mod order;
pub mod user;

use std::sync::Arc;

use axum::extract::State;

use super::response::{ok, ApiError, ApiResult};
use super::state::AppState;
use crate::db;

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<&'static str> {
    match db::ping(&state.pool).await {
        Ok(()) => ok("up"),
        Err(err) => ApiError::internal(err.to_string()).into_err(),
    }
}
