//! Core identifier types shared across the crate.
//!
//! All cross-table links are plain integer ids; the object graph is a forest
//! rooted at the coordinator, so no module needs more than these aliases.

/// Commodity (SKU) identifier, primary key of `commodity`.
pub type CommodityId = i64;

/// User identifier, primary key of `users`.
pub type UserId = i64;

/// Order identifier, primary key of `orders`. Doubles as the delay-queue
/// task id (rendered in decimal) on the cancellation path.
pub type OrderId = i64;

/// Cart row identifier.
pub type CartId = i64;
