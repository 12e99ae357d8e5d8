//! In-process fast store.
//!
//! Implements the same contracts as the Redis store against a mutex-guarded
//! map, for tests, the property suites and local development without a
//! Redis instance. Atomicity falls out of the single lock.
//!
//! The store owns its clock: `advance` shifts "now" so lease and due-time
//! behavior can be driven without sleeping. `set_fail_ack` /
//! `set_fail_increment` inject backend failures to exercise the
//! duplicate-claim and retry paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core_types::CommodityId;

use super::{ClaimBatch, CounterStore, Decrement, Increment, StoreError, TaskQueue};

#[derive(Default)]
struct Inner {
    stock: HashMap<CommodityId, i64>,
    delta: HashMap<CommodityId, i64>,
    /// task id -> due time (unix seconds)
    ready: HashMap<String, i64>,
    /// task id -> lease expiry (unix seconds)
    processing: HashMap<String, i64>,
    payload: HashMap<String, String>,
    done: HashMap<String, ()>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock_offset: AtomicI64,
    fail_ack: AtomicBool,
    fail_increment: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn now(&self) -> i64 {
        let base = chrono::Utc::now().timestamp();
        base + self.clock_offset.load(Ordering::SeqCst)
    }

    /// Shift the store clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock_offset
            .fetch_add(by.as_secs() as i64, Ordering::SeqCst);
    }

    /// Make subsequent `ack` calls fail until reset.
    pub fn set_fail_ack(&self, fail: bool) {
        self.fail_ack.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `increment_stock` calls fail until reset.
    pub fn set_fail_increment(&self, fail: bool) {
        self.fail_increment.store(fail, Ordering::SeqCst);
    }

    /// Drop a counter key, simulating TTL expiry.
    pub fn expire_stock(&self, id: CommodityId) {
        self.inner.lock().unwrap().stock.remove(&id);
    }

    /// Tasks currently in `ready`.
    pub fn ready_len(&self) -> usize {
        self.inner.lock().unwrap().ready.len()
    }

    /// Tasks currently in `processing`.
    pub fn processing_len(&self) -> usize {
        self.inner.lock().unwrap().processing.len()
    }

    /// Due time of a ready task, if present.
    pub fn ready_due(&self, task_id: &str) -> Option<i64> {
        self.inner.lock().unwrap().ready.get(task_id).copied()
    }

    pub fn ready_ids(&self) -> Vec<String> {
        self.inner.lock().unwrap().ready.keys().cloned().collect()
    }

    pub fn processing_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .processing
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn init_stock(&self, id: CommodityId, stock: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.stock.insert(id, stock);
        Ok(())
    }

    async fn decrement_stock(&self, id: CommodityId, qty: i64) -> Result<Decrement, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(&current) = inner.stock.get(&id) else {
            return Ok(Decrement::Miss);
        };
        if current < qty {
            return Ok(Decrement::Insufficient);
        }
        inner.stock.insert(id, current - qty);
        *inner.delta.entry(id).or_insert(0) += qty;
        Ok(Decrement::Ok {
            remaining: current - qty,
        })
    }

    async fn increment_stock(&self, id: CommodityId, qty: i64) -> Result<Increment, StoreError> {
        if self.fail_increment.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected increment failure".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        let Some(&current) = inner.stock.get(&id) else {
            return Ok(Increment::Miss);
        };
        inner.stock.insert(id, current + qty);
        *inner.delta.entry(id).or_insert(0) -= qty;
        Ok(Increment::Ok {
            stock: current + qty,
        })
    }

    async fn take_delta(&self, id: CommodityId) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.delta.get(&id).copied() {
            None | Some(0) => Ok(0),
            Some(delta) => {
                inner.delta.insert(id, 0);
                Ok(delta)
            }
        }
    }

    async fn put_back_delta(&self, id: CommodityId, delta: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        *inner.delta.entry(id).or_insert(0) += delta;
        Ok(())
    }

    async fn delta_keys(&self) -> Result<Vec<CommodityId>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.delta.keys().copied().collect())
    }

    async fn delta_value(&self, id: CommodityId) -> Result<Option<i64>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.delta.get(&id).copied())
    }

    async fn stock_value(&self, id: CommodityId) -> Result<Option<i64>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.stock.get(&id).copied())
    }
}

#[async_trait]
impl TaskQueue for MemoryStore {
    async fn enqueue(
        &self,
        task_id: &str,
        payload: &str,
        delay: Duration,
    ) -> Result<(), StoreError> {
        let due = self.now() + delay.as_secs() as i64;
        let mut inner = self.inner.lock().unwrap();
        inner.ready.insert(task_id.to_string(), due);
        inner
            .payload
            .insert(task_id.to_string(), payload.to_string());
        Ok(())
    }

    async fn claim(&self, max: i64, lease: Duration) -> Result<ClaimBatch, StoreError> {
        let now = self.now();
        let mut inner = self.inner.lock().unwrap();
        if inner.ready.is_empty() {
            return Ok(ClaimBatch::Empty);
        }
        let mut due: Vec<(i64, String)> = inner
            .ready
            .iter()
            .filter(|&(_, &score)| score <= now)
            .map(|(id, &score)| (score, id.clone()))
            .collect();
        if due.is_empty() {
            return Ok(ClaimBatch::NotDue);
        }
        due.sort();
        due.truncate(max.max(0) as usize);
        let expiry = now + lease.as_secs() as i64;
        let mut ids = Vec::with_capacity(due.len());
        for (_, id) in due {
            inner.ready.remove(&id);
            inner.processing.insert(id.clone(), expiry);
            ids.push(id);
        }
        Ok(ClaimBatch::Claimed(ids))
    }

    async fn ack(&self, task_id: &str) -> Result<(), StoreError> {
        if self.fail_ack.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected ack failure".into()));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.processing.remove(task_id);
        inner.payload.remove(task_id);
        Ok(())
    }

    async fn recover(&self, retry_delay: Duration) -> Result<u64, StoreError> {
        let now = self.now();
        let retry_at = now + retry_delay.as_secs() as i64;
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<String> = inner
            .processing
            .iter()
            .filter(|&(_, &expiry)| expiry <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            inner.processing.remove(id);
            inner.ready.insert(id.clone(), retry_at);
        }
        Ok(expired.len() as u64)
    }

    async fn payload(&self, task_id: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.payload.get(task_id).cloned())
    }

    async fn mark_done(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.done.insert(task_id.to_string(), ()).is_none())
    }

    async fn unmark_done(&self, task_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.done.remove(task_id);
        Ok(())
    }

    async fn is_done(&self, task_id: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.done.contains_key(task_id))
    }
}
