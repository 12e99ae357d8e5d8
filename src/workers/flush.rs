//! Stock-delta flush worker.
//!
//! Every period, enumerate commodities with a dirty delta ledger and write
//! each back into the durable stock column. Zero-delta commodities are
//! skipped by the flush itself, so the pass is idempotent.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::stock::StockCache;

use super::ShutdownRx;

pub struct FlushWorker {
    stock: Arc<StockCache>,
    period: Duration,
    shutdown: ShutdownRx,
}

impl FlushWorker {
    pub fn new(stock: Arc<StockCache>, period: Duration, shutdown: ShutdownRx) -> Self {
        Self {
            stock,
            period,
            shutdown,
        }
    }

    pub async fn run(self) {
        info!(period_secs = self.period.as_secs(), "stock flush worker started");
        let mut shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_pass().await;
                }
                _ = shutdown.changed() => {
                    info!("stock flush worker stopped");
                    return;
                }
            }
        }
    }

    /// One enumerate-and-flush sweep. Failures are logged per commodity.
    pub async fn flush_pass(&self) {
        let dirty = match self.stock.dirty_commodities().await {
            Ok(dirty) => dirty,
            Err(err) => {
                warn!(error = %err, "failed to enumerate dirty commodities");
                return;
            }
        };
        if dirty.is_empty() {
            return;
        }
        debug!(count = dirty.len(), "flushing dirty commodities");
        for id in dirty {
            if let Err(err) = self.stock.flush(id).await {
                warn!(commodity_id = id, error = %err, "stock flush failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryCommodityStore;
    use crate::store::{CounterStore, MemoryStore};

    #[tokio::test]
    async fn flush_pass_writes_back_and_continues_past_failures() {
        let store = Arc::new(MemoryStore::new());
        let commodities = Arc::new(MemoryCommodityStore::new());
        commodities.seed(1, "a", 10);
        // commodity 2 has a counter but no durable row: its flush fails
        let stock = Arc::new(StockCache::new(store.clone(), commodities.clone()));
        stock.init(1, 10).await.unwrap();
        stock.init(2, 5).await.unwrap();
        stock.decrement(1, 3).await.unwrap();
        stock.decrement(2, 1).await.unwrap();

        let (_tx, rx) = tokio::sync::watch::channel(false);
        let worker = FlushWorker::new(stock, Duration::from_secs(10), rx);
        worker.flush_pass().await;

        assert_eq!(commodities.stock_of(1), Some(7));
        assert_eq!(store.delta_value(1).await.unwrap(), Some(0));
        // the failed one kept its delta for the next pass
        assert_eq!(store.delta_value(2).await.unwrap(), Some(1));
    }
}
