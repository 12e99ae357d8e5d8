//! Delayed cancellation queue.
//!
//! A task lives in exactly one of `ready` or `processing` while its payload
//! key exists. `claim` is the only transition out of `ready` and is atomic
//! with the processing insertion; `recover` is the only way back. The
//! payload on the cancellation path is `"{commodity_id},{quantity}"` and
//! the task id is the order id in decimal.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core_types::{CommodityId, OrderId};
use crate::store::{ClaimBatch, StoreError, TaskQueue};

pub struct DelayQueue {
    store: Arc<dyn TaskQueue>,
}

impl DelayQueue {
    pub fn new(store: Arc<dyn TaskQueue>) -> Self {
        Self { store }
    }

    /// Schedule a stock restoration for `order_id`, due `delay` from now.
    pub async fn enqueue_cancellation(
        &self,
        order_id: OrderId,
        commodity_id: CommodityId,
        quantity: i64,
        delay: Duration,
    ) -> Result<(), StoreError> {
        let task_id = order_id.to_string();
        let payload = format_payload(commodity_id, quantity);
        self.store.enqueue(&task_id, &payload, delay).await?;
        debug!(
            order_id,
            commodity_id,
            quantity,
            delay_secs = delay.as_secs(),
            "cancellation task enqueued"
        );
        Ok(())
    }

    pub async fn claim(&self, max: i64, lease: Duration) -> Result<ClaimBatch, StoreError> {
        self.store.claim(max, lease).await
    }

    pub async fn ack(&self, task_id: &str) -> Result<(), StoreError> {
        self.store.ack(task_id).await
    }

    pub async fn recover(&self, retry_delay: Duration) -> Result<u64, StoreError> {
        self.store.recover(retry_delay).await
    }

    pub async fn payload(&self, task_id: &str) -> Result<Option<String>, StoreError> {
        self.store.payload(task_id).await
    }

    /// Claim the cancellation effect for this task. `true` means the caller
    /// is the only writer that will restore stock for it.
    pub async fn mark_done(&self, task_id: &str) -> Result<bool, StoreError> {
        self.store.mark_done(task_id).await
    }

    pub async fn unmark_done(&self, task_id: &str) -> Result<(), StoreError> {
        self.store.unmark_done(task_id).await
    }

    pub async fn is_done(&self, task_id: &str) -> Result<bool, StoreError> {
        self.store.is_done(task_id).await
    }
}

pub fn format_payload(commodity_id: CommodityId, quantity: i64) -> String {
    format!("{commodity_id},{quantity}")
}

/// Parse a `"{commodity_id},{quantity}"` payload.
pub fn parse_payload(payload: &str) -> Result<(CommodityId, i64), StoreError> {
    let mut parts = payload.splitn(2, ',');
    let commodity = parts
        .next()
        .and_then(|s| s.trim().parse::<CommodityId>().ok());
    let quantity = parts.next().and_then(|s| s.trim().parse::<i64>().ok());
    match (commodity, quantity) {
        (Some(c), Some(q)) if q > 0 => Ok((c, q)),
        _ => Err(StoreError::MalformedPayload(payload.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn payload_round_trip() {
        let payload = format_payload(42, 3);
        assert_eq!(payload, "42,3");
        assert_eq!(parse_payload(&payload).unwrap(), (42, 3));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        for bad in ["", "42", "a,b", "42,", "42,0", "42,-1", "42,3,9"] {
            assert!(parse_payload(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn task_lives_in_exactly_one_queue() {
        let store = Arc::new(MemoryStore::new());
        let queue = DelayQueue::new(store.clone());

        queue
            .enqueue_cancellation(1, 10, 2, Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(store.ready_len(), 1);
        assert_eq!(store.processing_len(), 0);

        store.advance(Duration::from_secs(1));
        let batch = queue.claim(100, Duration::from_secs(300)).await.unwrap();
        assert_eq!(batch, ClaimBatch::Claimed(vec!["1".to_string()]));
        assert_eq!(store.ready_len(), 0);
        assert_eq!(store.processing_len(), 1);
        assert_eq!(queue.payload("1").await.unwrap().as_deref(), Some("10,2"));

        queue.ack("1").await.unwrap();
        assert_eq!(store.ready_len(), 0);
        assert_eq!(store.processing_len(), 0);
        assert_eq!(queue.payload("1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn recover_never_invents_tasks() {
        let store = Arc::new(MemoryStore::new());
        let queue = DelayQueue::new(store.clone());
        assert_eq!(queue.recover(Duration::from_secs(60)).await.unwrap(), 0);

        queue
            .enqueue_cancellation(1, 10, 2, Duration::from_secs(0))
            .await
            .unwrap();
        store.advance(Duration::from_secs(1));
        queue.claim(100, Duration::from_secs(300)).await.unwrap();

        store.advance(Duration::from_secs(301));
        assert_eq!(queue.recover(Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.ready_len(), 1);
        // a second recover finds nothing left to move
        assert_eq!(queue.recover(Duration::from_secs(60)).await.unwrap(), 0);
    }
}
