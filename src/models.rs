//! Row types for the durable store.
//!
//! `Commodity.stock` is the authoritative slow copy; the fast-store counter
//! in [`crate::stock`] is derivative and reconciled by the flush worker.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{CartId, CommodityId, OrderId, UserId};

/// A sellable item. `status` is active/retired.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Commodity {
    pub id: CommodityId,
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
    pub status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order lifecycle states.
///
/// The coordinator only ever writes `Pending`; later transitions come in via
/// the status-update endpoint, which deliberately accepts any string so this
/// layer carries no state machine. The enum exists for the well-known values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order row. `total_price` stays a string end to end for accounting.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub commodity_id: CommodityId,
    pub quantity: i64,
    pub total_price: String,
    pub address: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the coordinator supplies when persisting a new order; the store
/// assigns the id.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub commodity_id: CommodityId,
    pub quantity: i64,
    pub total_price: String,
    pub address: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered user. `password` holds the argon2 hash, never plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub uid: UserId,
    pub account: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One cart line for one user/commodity pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: CartId,
    pub user_id: UserId,
    pub commodity_id: CommodityId,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
