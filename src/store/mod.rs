//! Fast-store adapter seams.
//!
//! Two traits cover everything the coordination core needs from the
//! in-memory store: per-commodity counters with a delta ledger
//! ([`CounterStore`]) and the three-state delay queue ([`TaskQueue`]).
//! [`redis::RedisStore`] is the production implementation; [`memory`]
//! provides an in-process one for tests and local development.
//!
//! Atomicity contract: `decrement_stock`, `increment_stock`, `take_delta`,
//! `claim` and `recover` must each execute as one atomic step in the
//! backing store. No concurrent writer may interleave between the stock
//! read and the delta write.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core_types::CommodityId;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Counter and ledger TTL. Refreshed on every mutation.
pub const COUNTER_TTL_SECS: u64 = 24 * 60 * 60;

/// Idempotency-flag TTL on the cancellation path.
pub const DONE_FLAG_TTL_SECS: u64 = 24 * 60 * 60;

pub(crate) const STOCK_KEY_PREFIX: &str = "stock_key_";
pub(crate) const DELTA_KEY_PREFIX: &str = "delta_key_";
pub(crate) const READY_KEY: &str = "dq:ready";
pub(crate) const PROCESSING_KEY: &str = "dq:processing";
pub(crate) const PAYLOAD_KEY_PREFIX: &str = "dq:payload:";
pub(crate) const DONE_FLAG_PREFIX: &str = "order_cancel_idempotent:";

pub(crate) fn stock_key(id: CommodityId) -> String {
    format!("{STOCK_KEY_PREFIX}{id}")
}

pub(crate) fn delta_key(id: CommodityId) -> String {
    format!("{DELTA_KEY_PREFIX}{id}")
}

pub(crate) fn payload_key(task_id: &str) -> String {
    format!("{PAYLOAD_KEY_PREFIX}{task_id}")
}

pub(crate) fn done_flag_key(task_id: &str) -> String {
    format!("{DONE_FLAG_PREFIX}{task_id}")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fast store backend: {0}")]
    Backend(String),
    #[error("malformed task payload: {0}")]
    MalformedPayload(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Result of an atomic stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// Stock and delta were mutated; `remaining` is the post-decrement value.
    Ok { remaining: i64 },
    /// The counter key is absent. The caller must initialize from the
    /// durable row and retry exactly once.
    Miss,
    /// Stock is below the requested quantity. Nothing was mutated.
    Insufficient,
}

/// Result of an atomic stock increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Increment {
    Ok { stock: i64 },
    Miss,
}

/// One `claim` call, split by queue state so the drain worker can pick
/// the matching backoff without sentinel errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimBatch {
    /// Up to `max` due tasks, now leased in `processing`.
    Claimed(Vec<String>),
    /// Tasks exist but none are due yet.
    NotDue,
    /// The ready queue is empty.
    Empty,
}

/// Per-commodity counter plus delta-ledger primitives.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Seed the counter. Overwrites; used only on cache miss.
    async fn init_stock(&self, id: CommodityId, stock: i64) -> Result<(), StoreError>;

    /// Atomic `stock -= qty; delta += qty` with the MISS/INSUFFICIENT guards.
    async fn decrement_stock(&self, id: CommodityId, qty: i64) -> Result<Decrement, StoreError>;

    /// Atomic inverse of `decrement_stock`.
    async fn increment_stock(&self, id: CommodityId, qty: i64) -> Result<Increment, StoreError>;

    /// Atomically read the delta and reset it to zero (TTL refreshed).
    /// Returns 0 when the ledger is absent or already clean.
    async fn take_delta(&self, id: CommodityId) -> Result<i64, StoreError>;

    /// Re-add a delta taken by [`take_delta`] after a failed writeback.
    async fn put_back_delta(&self, id: CommodityId, delta: i64) -> Result<(), StoreError>;

    /// Commodity ids that currently have a delta ledger key, dirty or not.
    async fn delta_keys(&self) -> Result<Vec<CommodityId>, StoreError>;

    /// Current ledger value, `None` when the key is absent.
    async fn delta_value(&self, id: CommodityId) -> Result<Option<i64>, StoreError>;

    /// Current counter value, `None` when the key is absent.
    async fn stock_value(&self, id: CommodityId) -> Result<Option<i64>, StoreError>;
}

/// Three-state delay queue plus the cancellation idempotency flag.
///
/// Time is the store's own clock, so concurrent scheduler processes agree
/// on "now" regardless of host clock skew.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Add a task due `delay` from now. The payload key has no TTL; the
    /// task owns it until `ack`.
    async fn enqueue(&self, task_id: &str, payload: &str, delay: Duration)
        -> Result<(), StoreError>;

    /// Atomically move up to `max` due tasks from `ready` into `processing`
    /// with a lease expiring `lease` from now.
    async fn claim(&self, max: i64, lease: Duration) -> Result<ClaimBatch, StoreError>;

    /// Remove the task from `processing` and delete its payload.
    /// Safe to replay.
    async fn ack(&self, task_id: &str) -> Result<(), StoreError>;

    /// Move every expired-lease task from `processing` back into `ready`,
    /// due `retry_delay` from now. Returns the number moved.
    async fn recover(&self, retry_delay: Duration) -> Result<u64, StoreError>;

    async fn payload(&self, task_id: &str) -> Result<Option<String>, StoreError>;

    /// Compare-and-set the idempotency flag. `true` means this caller set
    /// it and owns the cancellation effect; `false` means a previous
    /// restoration already ran.
    async fn mark_done(&self, task_id: &str) -> Result<bool, StoreError>;

    /// Drop the flag so a future claim may retry the restoration.
    async fn unmark_done(&self, task_id: &str) -> Result<(), StoreError>;

    async fn is_done(&self, task_id: &str) -> Result<bool, StoreError>;
}
