//! Cancellation drain worker.
//!
//! Claims due tasks and restores their stock at most once each. The
//! idempotency flag is the linearization point: whoever wins the
//! compare-and-set owns the restoration, and a duplicate claim observes
//! the flag and short-circuits straight to the ack. The payload read
//! happens after the CAS so a losing claimer has mutated nothing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dq::{parse_payload, DelayQueue};
use crate::models::OrderStatus;
use crate::persistence::{OrderStore, PersistError};
use crate::stock::StockCache;
use crate::store::{ClaimBatch, Increment};

use super::ShutdownRx;

#[derive(Debug, Clone)]
pub struct DrainConfig {
    pub period: Duration,
    /// Maximum tasks claimed per pass.
    pub claim_batch: i64,
    /// Lease on claimed tasks; must exceed the worst-case handling of one
    /// batch but stay inside the cancellation window.
    pub claim_lease: Duration,
    /// Pause when tasks exist but none are due.
    pub backoff_not_due: Duration,
    /// Pause when the ready queue is empty.
    pub backoff_empty: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(10),
            claim_batch: 100,
            claim_lease: Duration::from_secs(300),
            backoff_not_due: Duration::from_millis(500),
            backoff_empty: Duration::from_secs(1),
        }
    }
}

pub struct CancelWorker {
    queue: Arc<DelayQueue>,
    stock: Arc<StockCache>,
    orders: Arc<dyn OrderStore>,
    config: DrainConfig,
}

impl CancelWorker {
    pub fn new(
        queue: Arc<DelayQueue>,
        stock: Arc<StockCache>,
        orders: Arc<dyn OrderStore>,
        config: DrainConfig,
    ) -> Self {
        Self {
            queue,
            stock,
            orders,
            config,
        }
    }

    pub async fn run(self, mut shutdown: ShutdownRx) {
        info!(
            period_secs = self.config.period.as_secs(),
            claim_batch = self.config.claim_batch,
            "cancellation drain worker started"
        );
        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.drain_once().await;
                }
                _ = shutdown.changed() => {
                    info!("cancellation drain worker stopped");
                    return;
                }
            }
        }
    }

    /// Claim one batch and handle every task in it. Per-task failures are
    /// logged and the loop moves on; nothing propagates to the scheduler.
    pub async fn drain_once(&self) {
        let batch = match self
            .queue
            .claim(self.config.claim_batch, self.config.claim_lease)
            .await
        {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "claim failed");
                return;
            }
        };

        let ids = match batch {
            ClaimBatch::Claimed(ids) => ids,
            ClaimBatch::NotDue => {
                debug!("no tasks due yet");
                tokio::time::sleep(self.config.backoff_not_due).await;
                return;
            }
            ClaimBatch::Empty => {
                debug!("cancellation queue empty");
                tokio::time::sleep(self.config.backoff_empty).await;
                return;
            }
        };

        for id in ids {
            self.handle_task(&id).await;
        }
    }

    async fn handle_task(&self, task_id: &str) {
        // The CAS decides ownership of the restoration. Losing it means a
        // previous pass already restored; just reap the task.
        match self.queue.mark_done(task_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(task_id, "duplicate claim, restoration already applied");
                self.ack_logged(task_id).await;
                return;
            }
            Err(err) => {
                warn!(task_id, error = %err, "idempotency flag CAS failed");
                return;
            }
        }

        let payload = match self.queue.payload(task_id).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                warn!(task_id, "task payload missing, acking without restore");
                self.unmark_logged(task_id).await;
                self.ack_logged(task_id).await;
                return;
            }
            Err(err) => {
                warn!(task_id, error = %err, "payload read failed");
                self.unmark_logged(task_id).await;
                return;
            }
        };

        let (commodity_id, quantity) = match parse_payload(&payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(task_id, error = %err, "malformed payload, acking without restore");
                self.unmark_logged(task_id).await;
                self.ack_logged(task_id).await;
                return;
            }
        };

        // A paid order must keep its stock; ack and keep the flag so a
        // duplicate claim cannot restore either.
        match self.order_status(task_id).await {
            OrderFate::Paid => {
                info!(task_id, "order already paid, acking without restore");
                self.ack_logged(task_id).await;
                return;
            }
            OrderFate::Restorable => {}
            OrderFate::Unknown => {
                self.unmark_logged(task_id).await;
                return;
            }
        }

        // Restore the stock. On any failure, drop the flag and leave the
        // task leased; recovery will requeue it after the lease expires.
        match self.stock.increment(commodity_id, quantity).await {
            Ok(Increment::Ok { .. }) => {}
            Ok(Increment::Miss) => {
                warn!(task_id, commodity_id, "stock counter missing, will retry");
                self.unmark_logged(task_id).await;
                return;
            }
            Err(err) => {
                warn!(task_id, commodity_id, error = %err, "stock restore failed, will retry");
                self.unmark_logged(task_id).await;
                return;
            }
        }

        // If the ack fails the flag stays, and the duplicate-claim branch
        // reaps the task on the next cycle without restoring twice.
        match self.queue.ack(task_id).await {
            Ok(()) => {
                info!(task_id, commodity_id, quantity, "expired order cancelled, stock restored");
            }
            Err(err) => {
                warn!(task_id, error = %err, "ack failed after restore; duplicate claim will reap");
            }
        }
    }

    async fn order_status(&self, task_id: &str) -> OrderFate {
        let Ok(order_id) = task_id.parse::<i64>() else {
            // Task ids on this path are order ids; a foreign id has no row
            // to consult, so restore per the payload.
            return OrderFate::Restorable;
        };
        match self.orders.find_by_id(order_id).await {
            Ok(order) if order.status == OrderStatus::Paid.as_str() => OrderFate::Paid,
            Ok(_) => OrderFate::Restorable,
            // A deleted row does not suppress the restoration.
            Err(PersistError::NotFound) => OrderFate::Restorable,
            Err(err) => {
                warn!(task_id, error = %err, "order lookup failed, will retry");
                OrderFate::Unknown
            }
        }
    }

    async fn ack_logged(&self, task_id: &str) {
        if let Err(err) = self.queue.ack(task_id).await {
            warn!(task_id, error = %err, "ack failed");
        }
    }

    async fn unmark_logged(&self, task_id: &str) {
        if let Err(err) = self.queue.unmark_done(task_id).await {
            warn!(task_id, error = %err, "failed to clear idempotency flag");
        }
    }
}

enum OrderFate {
    Paid,
    Restorable,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewOrder;
    use crate::persistence::{MemoryCommodityStore, MemoryOrderStore};
    use crate::store::{CounterStore, MemoryStore, TaskQueue};
    use chrono::Utc;

    struct Fixture {
        store: Arc<MemoryStore>,
        orders: Arc<MemoryOrderStore>,
        queue: Arc<DelayQueue>,
        worker: CancelWorker,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let commodities = Arc::new(MemoryCommodityStore::new());
        let orders = Arc::new(MemoryOrderStore::new());
        let stock = Arc::new(StockCache::new(store.clone(), commodities));
        let queue = Arc::new(DelayQueue::new(store.clone()));
        let worker = CancelWorker::new(
            queue.clone(),
            stock,
            orders.clone(),
            DrainConfig {
                backoff_not_due: Duration::from_millis(0),
                backoff_empty: Duration::from_millis(0),
                ..DrainConfig::default()
            },
        );
        Fixture {
            store,
            orders,
            queue,
            worker,
        }
    }

    async fn seed_order(f: &Fixture, commodity_id: i64, quantity: i64) -> i64 {
        let now = Utc::now();
        let order = f
            .orders
            .create(NewOrder {
                user_id: 1,
                commodity_id,
                quantity,
                total_price: "0".into(),
                address: "addr".into(),
                status: "pending".into(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        order.id
    }

    #[tokio::test]
    async fn drain_restores_stock_exactly_once() {
        let f = fixture();
        f.store.init_stock(1, 10).await.unwrap();
        f.store.decrement_stock(1, 3).await.unwrap();
        let order_id = seed_order(&f, 1, 3).await;
        f.queue
            .enqueue_cancellation(order_id, 1, 3, Duration::from_secs(900))
            .await
            .unwrap();

        f.store.advance(Duration::from_secs(901));
        f.worker.drain_once().await;

        let task_id = order_id.to_string();
        assert_eq!(f.store.stock_value(1).await.unwrap(), Some(10));
        assert_eq!(f.store.delta_value(1).await.unwrap(), Some(0));
        assert!(f.queue.is_done(&task_id).await.unwrap());
        assert_eq!(f.queue.payload(&task_id).await.unwrap(), None);
        assert_eq!(f.store.ready_len(), 0);
        assert_eq!(f.store.processing_len(), 0);
    }

    #[tokio::test]
    async fn duplicate_claim_after_failed_ack_does_not_double_restore() {
        let f = fixture();
        f.store.init_stock(1, 10).await.unwrap();
        f.store.decrement_stock(1, 3).await.unwrap();
        let order_id = seed_order(&f, 1, 3).await;
        f.queue
            .enqueue_cancellation(order_id, 1, 3, Duration::from_secs(900))
            .await
            .unwrap();

        // First pass: restore succeeds, ack fails, task stays leased.
        f.store.advance(Duration::from_secs(901));
        f.store.set_fail_ack(true);
        f.worker.drain_once().await;
        f.store.set_fail_ack(false);

        assert_eq!(f.store.stock_value(1).await.unwrap(), Some(10));
        assert_eq!(f.store.processing_len(), 1);

        // Lease expires; recovery requeues; second pass must skip the
        // restore and just reap.
        f.store.advance(Duration::from_secs(301));
        f.queue.recover(Duration::from_secs(0)).await.unwrap();
        f.store.advance(Duration::from_secs(1));
        f.worker.drain_once().await;

        assert_eq!(f.store.stock_value(1).await.unwrap(), Some(10));
        assert_eq!(f.store.ready_len(), 0);
        assert_eq!(f.store.processing_len(), 0);
    }

    #[tokio::test]
    async fn failed_restore_leaves_task_for_recovery() {
        let f = fixture();
        f.store.init_stock(1, 10).await.unwrap();
        f.store.decrement_stock(1, 3).await.unwrap();
        let order_id = seed_order(&f, 1, 3).await;
        f.queue
            .enqueue_cancellation(order_id, 1, 3, Duration::from_secs(0))
            .await
            .unwrap();

        f.store.advance(Duration::from_secs(1));
        f.store.set_fail_increment(true);
        f.worker.drain_once().await;
        f.store.set_fail_increment(false);

        let task_id = order_id.to_string();
        // flag cleared so the retry can restore; task still leased
        assert!(!f.queue.is_done(&task_id).await.unwrap());
        assert_eq!(f.store.processing_len(), 1);
        assert_eq!(f.store.stock_value(1).await.unwrap(), Some(7));

        f.store.advance(Duration::from_secs(301));
        f.queue.recover(Duration::from_secs(0)).await.unwrap();
        f.store.advance(Duration::from_secs(1));
        f.worker.drain_once().await;
        assert_eq!(f.store.stock_value(1).await.unwrap(), Some(10));
        assert_eq!(f.store.processing_len(), 0);
    }

    #[tokio::test]
    async fn paid_order_is_acked_without_restore() {
        let f = fixture();
        f.store.init_stock(1, 10).await.unwrap();
        f.store.decrement_stock(1, 3).await.unwrap();
        let order_id = seed_order(&f, 1, 3).await;
        f.orders.update_status(order_id, "paid").await.unwrap();
        f.queue
            .enqueue_cancellation(order_id, 1, 3, Duration::from_secs(0))
            .await
            .unwrap();

        f.store.advance(Duration::from_secs(1));
        f.worker.drain_once().await;

        // stock stays sold; task fully reaped
        assert_eq!(f.store.stock_value(1).await.unwrap(), Some(7));
        assert_eq!(f.store.ready_len(), 0);
        assert_eq!(f.store.processing_len(), 0);
        assert_eq!(f.queue.payload(&order_id.to_string()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_payload_is_reaped_with_flag_cleared() {
        let f = fixture();
        f.store
            .enqueue("77", "not-a-payload", Duration::from_secs(0))
            .await
            .unwrap();

        f.store.advance(Duration::from_secs(1));
        f.worker.drain_once().await;

        assert!(!f.queue.is_done("77").await.unwrap());
        assert_eq!(f.store.ready_len(), 0);
        assert_eq!(f.store.processing_len(), 0);
    }
}
