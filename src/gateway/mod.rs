//! HTTP gateway.
//!
//! Everything lives under `/v1`. Login and registration are public; the
//! rest sits behind the bearer-token middleware, which injects the
//! authenticated user into request extensions.

pub mod handlers;
pub mod response;
pub mod state;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::auth::jwt_auth_middleware;
use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let authed = Router::new()
        .route("/user", get(handlers::user::profile))
        .route("/commodity", post(handlers::commodity::create))
        .route("/commodity", get(handlers::commodity::list))
        .route("/commodity/search", get(handlers::commodity::search))
        .route("/commodity/{id}", get(handlers::commodity::get_by_id))
        .route("/commodity/{id}", put(handlers::commodity::update))
        .route("/commodity/{id}", delete(handlers::commodity::remove))
        .route("/cart", post(handlers::cart::add_item))
        .route("/cart", get(handlers::cart::list_mine))
        .route("/cart/{id}", put(handlers::cart::update_item))
        .route("/cart/{id}", delete(handlers::cart::remove_item))
        .route("/order", post(handlers::order::create))
        .route("/order", get(handlers::order::list_mine))
        .route("/order/{id}", get(handlers::order::get_by_id))
        .route("/order/{id}", put(handlers::order::update))
        .route("/order/{id}", delete(handlers::order::remove))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    let v1 = Router::new()
        .route("/register", post(handlers::user::register))
        .route("/login", post(handlers::user::login))
        .merge(authed);

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/v1", v1)
        .with_state(state)
}
