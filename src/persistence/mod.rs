//! Durable-store repositories.
//!
//! Commodity and order access sit behind traits because the coordination
//! core and its tests need a seam; user and cart repositories are plain
//! structs used only by the gateway. All queries are runtime-checked so
//! the crate builds without a live database.

pub mod cart;
pub mod commodity;
pub mod memory;
pub mod order;
pub mod schema;
pub mod user;

use async_trait::async_trait;
use thiserror::Error;

use crate::core_types::{CommodityId, OrderId, UserId};
use crate::models::{Commodity, NewOrder, Order};

pub use cart::PgCartRepository;
pub use commodity::PgCommodityRepository;
pub use memory::{MemoryCommodityStore, MemoryOrderStore};
pub use order::PgOrderRepository;
pub use user::PgUserRepository;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("row not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("durable store unavailable: {0}")]
    Unavailable(String),
}

/// Fields supplied when creating a commodity; the store assigns the rest.
#[derive(Debug, Clone)]
pub struct NewCommodity {
    pub name: String,
    pub price: rust_decimal::Decimal,
}

#[async_trait]
pub trait CommodityStore: Send + Sync {
    async fn create(&self, new: NewCommodity) -> Result<Commodity, PersistError>;
    async fn update(&self, commodity: &Commodity) -> Result<(), PersistError>;
    async fn delete(&self, id: CommodityId) -> Result<(), PersistError>;
    async fn find_by_id(&self, id: CommodityId) -> Result<Commodity, PersistError>;
    async fn find_by_name(&self, name: &str) -> Result<Vec<Commodity>, PersistError>;
    async fn list(&self) -> Result<Vec<Commodity>, PersistError>;

    /// The writeback: `UPDATE commodity SET stock = stock - delta WHERE id = ?`.
    /// Zero rows affected is an error so the caller can compensate the ledger.
    async fn discount_stock(&self, id: CommodityId, delta: i64) -> Result<(), PersistError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, new: NewOrder) -> Result<Order, PersistError>;
    async fn update_status(&self, id: OrderId, status: &str) -> Result<(), PersistError>;
    async fn update_address(&self, id: OrderId, address: &str) -> Result<(), PersistError>;
    async fn delete(&self, id: OrderId) -> Result<(), PersistError>;
    async fn find_by_id(&self, id: OrderId) -> Result<Order, PersistError>;
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>, PersistError>;
}
