//! User registration, login and profile.

use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::AuthUser;
use crate::gateway::response::{codes, ok, ApiError, ApiResult};
use crate::gateway::state::AppState;
use crate::models::User;
use crate::persistence::PersistError;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 64, message = "account must be 3-64 characters"))]
    pub account: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub account: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: i64,
    pub account: String,
    pub name: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<User> {
    if let Err(errors) = req.validate() {
        return ApiError::bad_request(errors.to_string()).into_err();
    }
    match state.auth.register(&req.account, &req.password, &req.name).await {
        Ok(user) => {
            tracing::info!(user_id = user.uid, "user registered");
            ok(user)
        }
        Err(err) => ApiError::new(
            axum::http::StatusCode::BAD_REQUEST,
            codes::USER_ALREADY_EXISTS,
            err.to_string(),
        )
        .into_err(),
    }
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    match state.auth.login(&req.account, &req.password).await {
        Ok((token, user)) => ok(LoginResponse {
            token,
            user_id: user.uid,
            account: user.account,
            name: user.name,
        }),
        Err(err) => ApiError::new(
            axum::http::StatusCode::UNAUTHORIZED,
            codes::INVALID_PASSWORD,
            err.to_string(),
        )
        .into_err(),
    }
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<User> {
    match state.auth.profile(user.user_id).await {
        Ok(user) => ok(user),
        Err(PersistError::NotFound) => {
            ApiError::not_found(codes::USER_NOT_FOUND, "user not found").into_err()
        }
        Err(err) => ApiError::from(err).into_err(),
    }
}
