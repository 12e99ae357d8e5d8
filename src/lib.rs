//! flashmart - Inventory-and-order coordination core
//!
//! An e-commerce backend whose hard part is keeping three subsystems
//! honest under concurrency:
//!
//! # Modules
//!
//! - [`core_types`] - Shared id aliases
//! - [`config`] - YAML application configuration
//! - [`models`] - Durable row types
//! - [`db`] - PostgreSQL pool management
//! - [`store`] - Fast-store adapters (Redis and in-process)
//! - [`stock`] - Stock cache coordinator with the delta ledger
//! - [`dq`] - Delayed cancellation queue
//! - [`order`] - Order coordinator (create / mutate / query)
//! - [`workers`] - Flush, drain and recovery loops
//! - [`persistence`] - Repositories over the durable store
//! - [`auth`] - Password hashing, JWT issue/verify, middleware
//! - [`gateway`] - axum router, handlers and response envelope

// Core types - must be first!
pub mod core_types;

// Configuration and observability
pub mod config;
pub mod logging;

// Storage layers
pub mod db;
pub mod persistence;
pub mod store;

// Coordination core
pub mod dq;
pub mod order;
pub mod stock;
pub mod workers;

// HTTP surface
pub mod auth;
pub mod gateway;

pub mod models;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use core_types::{CartId, CommodityId, OrderId, UserId};
pub use dq::DelayQueue;
pub use models::{CartItem, Commodity, Order, OrderStatus, User};
pub use order::{OrderCoordinator, OrderError};
pub use stock::{FlushOutcome, StockCache, StockError};
pub use store::{ClaimBatch, CounterStore, Decrement, Increment, MemoryStore, RedisStore, TaskQueue};
