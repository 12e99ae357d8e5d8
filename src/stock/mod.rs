//! Stock cache coordinator.
//!
//! Fronts the durable `commodity.stock` column with a fast-store counter
//! and a delta ledger. Whenever both exist:
//!
//! ```text
//! durable.stock - delta = fast.stock
//! ```
//!
//! Decrements land on the counter and accumulate in the ledger; the flush
//! worker periodically writes the ledger back into the durable column. A
//! failed writeback re-adds the taken delta so no decrement is ever lost.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::core_types::CommodityId;
use crate::persistence::{CommodityStore, PersistError};
use crate::store::{CounterStore, Decrement, Increment, StoreError};

#[derive(Debug, Error)]
pub enum StockError {
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("stock writeback failed for commodity {id}: {source}")]
    Writeback {
        id: CommodityId,
        source: PersistError,
    },
}

/// Result of one writeback attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// `delta` was subtracted from the durable stock and the ledger reset.
    Flushed { delta: i64 },
    /// The ledger was absent or already clean.
    NoDelta,
}

pub struct StockCache {
    counters: Arc<dyn CounterStore>,
    commodities: Arc<dyn CommodityStore>,
}

impl StockCache {
    pub fn new(counters: Arc<dyn CounterStore>, commodities: Arc<dyn CommodityStore>) -> Self {
        Self {
            counters,
            commodities,
        }
    }

    /// Seed the counter from a durable value. Overwrites; only callers that
    /// just observed a MISS should use it.
    pub async fn init(&self, id: CommodityId, stock: i64) -> Result<(), StockError> {
        self.counters.init_stock(id, stock).await?;
        debug!(commodity_id = id, stock, "stock counter initialized");
        Ok(())
    }

    pub async fn decrement(&self, id: CommodityId, qty: i64) -> Result<Decrement, StockError> {
        if qty <= 0 {
            return Err(StockError::InvalidQuantity(qty));
        }
        Ok(self.counters.decrement_stock(id, qty).await?)
    }

    pub async fn increment(&self, id: CommodityId, qty: i64) -> Result<Increment, StockError> {
        if qty <= 0 {
            return Err(StockError::InvalidQuantity(qty));
        }
        Ok(self.counters.increment_stock(id, qty).await?)
    }

    /// Write the ledger back into the durable column.
    ///
    /// The delta is taken (atomically reset to zero) first; if the SQL
    /// update then fails or touches no row, the delta is re-added before
    /// the error surfaces, so a later flush retries the full amount.
    pub async fn flush(&self, id: CommodityId) -> Result<FlushOutcome, StockError> {
        let delta = self.counters.take_delta(id).await?;
        if delta == 0 {
            return Ok(FlushOutcome::NoDelta);
        }

        match self.commodities.discount_stock(id, delta).await {
            Ok(()) => {
                debug!(commodity_id = id, delta, "stock delta written back");
                Ok(FlushOutcome::Flushed { delta })
            }
            Err(source) => {
                if let Err(put_back) = self.counters.put_back_delta(id, delta).await {
                    // Both sides failed; the delta is lost until an operator
                    // reconciles from the order log.
                    warn!(
                        commodity_id = id,
                        delta,
                        error = %put_back,
                        "failed to restore delta after writeback failure"
                    );
                }
                Err(StockError::Writeback { id, source })
            }
        }
    }

    /// Commodity ids whose ledger exists and is non-zero.
    pub async fn dirty_commodities(&self) -> Result<Vec<CommodityId>, StockError> {
        let mut dirty = Vec::new();
        for id in self.counters.delta_keys().await? {
            match self.counters.delta_value(id).await {
                Ok(Some(delta)) if delta != 0 => dirty.push(id),
                Ok(_) => {}
                Err(err) => warn!(commodity_id = id, error = %err, "failed to read delta"),
            }
        }
        Ok(dirty)
    }

    /// Current counter value, for handlers that surface live stock.
    pub async fn cached_stock(&self, id: CommodityId) -> Result<Option<i64>, StockError> {
        Ok(self.counters.stock_value(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryCommodityStore;
    use crate::store::MemoryStore;

    fn cache() -> (Arc<MemoryStore>, Arc<MemoryCommodityStore>, StockCache) {
        let store = Arc::new(MemoryStore::new());
        let commodities = Arc::new(MemoryCommodityStore::new());
        let cache = StockCache::new(store.clone(), commodities.clone());
        (store, commodities, cache)
    }

    #[tokio::test]
    async fn rejects_non_positive_quantity() {
        let (_, _, cache) = cache();
        assert!(matches!(
            cache.decrement(1, 0).await,
            Err(StockError::InvalidQuantity(0))
        ));
        assert!(matches!(
            cache.increment(1, -3).await,
            Err(StockError::InvalidQuantity(-3))
        ));
    }

    #[tokio::test]
    async fn delta_equation_holds_after_mutations() {
        let (store, _, cache) = cache();
        cache.init(1, 10).await.unwrap();

        cache.decrement(1, 3).await.unwrap();
        cache.decrement(1, 2).await.unwrap();
        cache.increment(1, 1).await.unwrap();

        let stock = store.stock_value(1).await.unwrap().unwrap();
        let delta = store.delta_value(1).await.unwrap().unwrap();
        assert_eq!(stock + delta, 10);
        assert_eq!(stock, 6);
        assert_eq!(delta, 4);
    }

    #[tokio::test]
    async fn flush_moves_delta_into_durable_stock() {
        let (store, commodities, cache) = cache();
        commodities.seed(1, "widget", 10);
        cache.init(1, 10).await.unwrap();
        cache.decrement(1, 3).await.unwrap();

        let outcome = cache.flush(1).await.unwrap();
        assert_eq!(outcome, FlushOutcome::Flushed { delta: 3 });
        assert_eq!(commodities.stock_of(1), Some(7));
        assert_eq!(store.delta_value(1).await.unwrap(), Some(0));
        // the fast counter is untouched by a flush
        assert_eq!(store.stock_value(1).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn flush_with_clean_ledger_is_no_delta() {
        let (_, commodities, cache) = cache();
        commodities.seed(1, "widget", 10);
        cache.init(1, 10).await.unwrap();
        assert_eq!(cache.flush(1).await.unwrap(), FlushOutcome::NoDelta);
    }

    #[tokio::test]
    async fn failed_writeback_restores_delta() {
        let (store, commodities, cache) = cache();
        commodities.seed(1, "widget", 10);
        cache.init(1, 10).await.unwrap();
        cache.decrement(1, 4).await.unwrap();

        commodities.set_fail_discount(true);
        let err = cache.flush(1).await.unwrap_err();
        assert!(matches!(err, StockError::Writeback { id: 1, .. }));

        // pre-flush value is back; durable row unchanged
        assert_eq!(store.delta_value(1).await.unwrap(), Some(4));
        assert_eq!(commodities.stock_of(1), Some(10));

        commodities.set_fail_discount(false);
        assert_eq!(
            cache.flush(1).await.unwrap(),
            FlushOutcome::Flushed { delta: 4 }
        );
        assert_eq!(commodities.stock_of(1), Some(6));
    }

    #[tokio::test]
    async fn writeback_against_missing_row_restores_delta() {
        let (store, _, cache) = cache();
        // no durable row seeded
        cache.init(7, 5).await.unwrap();
        cache.decrement(7, 2).await.unwrap();

        assert!(cache.flush(7).await.is_err());
        assert_eq!(store.delta_value(7).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn dirty_commodities_skips_clean_ledgers() {
        let (_, commodities, cache) = cache();
        commodities.seed(1, "a", 10);
        commodities.seed(2, "b", 10);
        cache.init(1, 10).await.unwrap();
        cache.init(2, 10).await.unwrap();

        cache.decrement(1, 1).await.unwrap();
        cache.decrement(2, 2).await.unwrap();
        cache.increment(2, 2).await.unwrap(); // nets to zero

        let dirty = cache.dirty_commodities().await.unwrap();
        assert_eq!(dirty, vec![1]);
    }
}
