//! Commodity endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::CommodityId;
use crate::gateway::response::{codes, ok, ApiError, ApiResult};
use crate::gateway::state::AppState;
use crate::models::Commodity;
use crate::persistence::{NewCommodity, PersistError};

#[derive(Debug, Deserialize)]
pub struct CreateCommodityRequest {
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommodityRequest {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub name: String,
}

/// Commodity plus the live counter value, when the cache is warm.
#[derive(Debug, Serialize)]
pub struct CommodityView {
    #[serde(flatten)]
    pub commodity: Commodity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_stock: Option<i64>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCommodityRequest>,
) -> ApiResult<Commodity> {
    if req.name.trim().is_empty() {
        return ApiError::bad_request("name must not be empty").into_err();
    }
    match state
        .commodities
        .create(NewCommodity {
            name: req.name,
            price: req.price,
        })
        .await
    {
        Ok(commodity) => ok(commodity),
        Err(err) => ApiError::new(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            codes::COMMODITY_CREATE_FAILED,
            err.to_string(),
        )
        .into_err(),
    }
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CommodityId>,
    Json(req): Json<UpdateCommodityRequest>,
) -> ApiResult<Commodity> {
    let mut commodity = match state.commodities.find_by_id(id).await {
        Ok(c) => c,
        Err(PersistError::NotFound) => {
            return ApiError::not_found(codes::COMMODITY_NOT_FOUND, "commodity not found")
                .into_err();
        }
        Err(err) => return ApiError::from(err).into_err(),
    };

    if let Some(name) = req.name {
        commodity.name = name;
    }
    if let Some(price) = req.price {
        commodity.price = price;
    }
    if let Some(stock) = req.stock {
        commodity.stock = stock;
    }

    match state.commodities.update(&commodity).await {
        Ok(()) => ok(commodity),
        Err(err) => ApiError::from(err).into_err(),
    }
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CommodityId>,
) -> ApiResult<()> {
    match state.commodities.delete(id).await {
        Ok(()) => ok(()),
        Err(PersistError::NotFound) => {
            ApiError::not_found(codes::COMMODITY_NOT_FOUND, "commodity not found").into_err()
        }
        Err(err) => ApiError::from(err).into_err(),
    }
}

pub async fn get_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CommodityId>,
) -> ApiResult<CommodityView> {
    let commodity = match state.commodities.find_by_id(id).await {
        Ok(c) => c,
        Err(PersistError::NotFound) => {
            return ApiError::not_found(codes::COMMODITY_NOT_FOUND, "commodity not found")
                .into_err();
        }
        Err(err) => return ApiError::from(err).into_err(),
    };
    let cached_stock = state.stock.cached_stock(id).await.unwrap_or(None);
    ok(CommodityView {
        commodity,
        cached_stock,
    })
}

pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Commodity>> {
    match state.commodities.list().await {
        Ok(rows) => ok(rows),
        Err(err) => ApiError::from(err).into_err(),
    }
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<Commodity>> {
    if query.name.is_empty() {
        return ApiError::bad_request("name must not be empty").into_err();
    }
    match state.commodities.find_by_name(&query.name).await {
        Ok(rows) => ok(rows),
        Err(err) => ApiError::from(err).into_err(),
    }
}
