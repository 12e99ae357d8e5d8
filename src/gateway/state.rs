//! Shared handler state.

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::UserAuthService;
use crate::order::OrderCoordinator;
use crate::persistence::{CommodityStore, PgCartRepository};
use crate::stock::StockCache;

/// Everything the handlers need, injected once at startup.
pub struct AppState {
    pub pool: PgPool,
    pub coordinator: Arc<OrderCoordinator>,
    pub commodities: Arc<dyn CommodityStore>,
    pub stock: Arc<StockCache>,
    pub carts: Arc<PgCartRepository>,
    pub auth: Arc<UserAuthService>,
}
