//! Property suites: random interleavings against the in-process store.
//!
//! The counter suite checks the no-oversell and ledger invariants across
//! arbitrary Decrement/Increment/Flush sequences; the queue suite checks
//! exclusivity and the at-most-once cancellation effect across arbitrary
//! Enqueue/Claim/Ack/Recover schedules.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use flashmart::dq::DelayQueue;
use flashmart::persistence::{MemoryCommodityStore, MemoryOrderStore, OrderStore};
use flashmart::stock::StockCache;
use flashmart::store::{ClaimBatch, CounterStore, MemoryStore, TaskQueue};
use flashmart::workers::{CancelWorker, DrainConfig};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to build runtime")
}

#[derive(Debug, Clone)]
enum StockOp {
    Decrement(i64),
    Increment(i64),
    Flush,
}

fn stock_op() -> impl Strategy<Value = StockOp> {
    prop_oneof![
        (1i64..5).prop_map(StockOp::Decrement),
        (1i64..5).prop_map(StockOp::Increment),
        Just(StockOp::Flush),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// No interleaving of counter operations may oversell or break
    /// `durable.stock - delta = fast.stock`.
    #[test]
    fn counter_interleavings_preserve_invariants(
        initial in 0i64..50,
        ops in proptest::collection::vec(stock_op(), 1..40),
    ) {
        runtime().block_on(async move {
            let store = Arc::new(MemoryStore::new());
            let commodities = Arc::new(MemoryCommodityStore::new());
            commodities.seed(1, "prop", initial);
            let cache = StockCache::new(store.clone(), commodities.clone());
            cache.init(1, initial).await.unwrap();

            let mut sold = 0i64; // successful decrements minus increments

            for op in ops {
                match op {
                    StockOp::Decrement(q) => {
                        if let flashmart::store::Decrement::Ok { .. } =
                            cache.decrement(1, q).await.unwrap()
                        {
                            sold += q;
                        }
                    }
                    StockOp::Increment(q) => {
                        // only give back what is actually sold, as the
                        // cancellation path does
                        if sold >= q {
                            if let flashmart::store::Increment::Ok { .. } =
                                cache.increment(1, q).await.unwrap()
                            {
                                sold -= q;
                            }
                        }
                    }
                    StockOp::Flush => {
                        cache.flush(1).await.unwrap();
                    }
                }

                let fast = store.stock_value(1).await.unwrap().unwrap();
                let delta = store.delta_value(1).await.unwrap().unwrap_or(0);
                let durable = commodities.stock_of(1).unwrap();

                prop_assert!(fast >= 0, "counter went negative: {fast}");
                prop_assert!(sold <= initial, "oversold: {sold} of {initial}");
                prop_assert_eq!(durable - delta, fast, "ledger equation broken");
            }

            // after a final flush the durable column holds exactly what is sold
            cache.flush(1).await.unwrap();
            prop_assert_eq!(commodities.stock_of(1).unwrap(), initial - sold);
            Ok(())
        })?;
    }
}

#[derive(Debug, Clone)]
enum QueueOp {
    Enqueue(u8),
    Advance(u16),
    Claim(u8),
    AckClaimed,
    Recover,
}

fn queue_op() -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        (0u8..20).prop_map(QueueOp::Enqueue),
        (1u16..400).prop_map(QueueOp::Advance),
        (1u8..10).prop_map(QueueOp::Claim),
        Just(QueueOp::AckClaimed),
        Just(QueueOp::Recover),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every live task sits in exactly one of `ready` / `processing`;
    /// `recover` never invents tasks.
    #[test]
    fn queue_interleavings_preserve_exclusivity(
        ops in proptest::collection::vec(queue_op(), 1..60),
    ) {
        runtime().block_on(async move {
            let store = Arc::new(MemoryStore::new());
            let mut live: HashSet<String> = HashSet::new();
            let mut claimed: Vec<String> = Vec::new();

            for op in ops {
                match op {
                    QueueOp::Enqueue(id) => {
                        // task ids are order ids, unique per live task
                        let task = format!("task-{id}");
                        if !live.contains(&task) {
                            store
                                .enqueue(&task, "1,1", Duration::from_secs(30))
                                .await
                                .unwrap();
                            live.insert(task);
                        }
                    }
                    QueueOp::Advance(secs) => {
                        store.advance(Duration::from_secs(secs as u64));
                    }
                    QueueOp::Claim(max) => {
                        if let ClaimBatch::Claimed(ids) = store
                            .claim(max as i64, Duration::from_secs(120))
                            .await
                            .unwrap()
                        {
                            claimed.extend(ids);
                        }
                    }
                    QueueOp::AckClaimed => {
                        if let Some(id) = claimed.pop() {
                            // an ack only kills the task while its lease is
                            // held; after recovery it lives on in `ready`
                            let leased = store.processing_ids().contains(&id);
                            store.ack(&id).await.unwrap();
                            if leased {
                                live.remove(&id);
                            }
                        }
                    }
                    QueueOp::Recover => {
                        store.recover(Duration::from_secs(10)).await.unwrap();
                    }
                }

                let ready: HashSet<String> = store.ready_ids().into_iter().collect();
                let processing: HashSet<String> = store.processing_ids().into_iter().collect();

                prop_assert!(
                    ready.is_disjoint(&processing),
                    "task in both queues: ready={ready:?} processing={processing:?}"
                );
                let union: HashSet<String> = ready.union(&processing).cloned().collect();
                prop_assert_eq!(&union, &live, "live set drifted");
            }
            Ok(())
        })?;
    }
}

#[derive(Debug, Clone)]
enum DrainOp {
    Advance(u16),
    Drain,
    DrainWithAckFailure,
    Recover,
}

fn drain_op() -> impl Strategy<Value = DrainOp> {
    prop_oneof![
        (1u16..600).prop_map(DrainOp::Advance),
        Just(DrainOp::Drain),
        Just(DrainOp::DrainWithAckFailure),
        Just(DrainOp::Recover),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Across any claim/recover/ack-failure schedule, a cancellation task
    /// restores its quantity at most once.
    #[test]
    fn cancellation_effect_is_at_most_once(
        ops in proptest::collection::vec(drain_op(), 1..30),
    ) {
        runtime().block_on(async move {
            let initial = 10i64;
            let qty = 3i64;

            let store = Arc::new(MemoryStore::new());
            let commodities = Arc::new(MemoryCommodityStore::new());
            commodities.seed(1, "prop", initial);
            let orders = Arc::new(MemoryOrderStore::new());
            let stock = Arc::new(StockCache::new(store.clone(), commodities.clone()));
            let queue = Arc::new(DelayQueue::new(store.clone()));
            let worker = CancelWorker::new(
                queue.clone(),
                stock.clone(),
                orders.clone(),
                DrainConfig {
                    backoff_not_due: Duration::from_millis(0),
                    backoff_empty: Duration::from_millis(0),
                    claim_lease: Duration::from_secs(120),
                    ..DrainConfig::default()
                },
            );

            store.init_stock(1, initial).await.unwrap();
            store.decrement_stock(1, qty).await.unwrap();
            let now = chrono::Utc::now();
            let order = orders
                .create(flashmart::models::NewOrder {
                    user_id: 1,
                    commodity_id: 1,
                    quantity: qty,
                    total_price: "0".into(),
                    address: "addr".into(),
                    status: "pending".into(),
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
            queue
                .enqueue_cancellation(order.id, 1, qty, Duration::from_secs(60))
                .await
                .unwrap();

            for op in ops {
                match op {
                    DrainOp::Advance(secs) => store.advance(Duration::from_secs(secs as u64)),
                    DrainOp::Drain => worker.drain_once().await,
                    DrainOp::DrainWithAckFailure => {
                        store.set_fail_ack(true);
                        worker.drain_once().await;
                        store.set_fail_ack(false);
                    }
                    DrainOp::Recover => {
                        store.recover(Duration::from_secs(0)).await.unwrap();
                    }
                }

                let fast = store.stock_value(1).await.unwrap().unwrap();
                prop_assert!(
                    fast <= initial,
                    "restored more than once: stock {fast} > initial {initial}"
                );
            }

            // settle: let any leased task retry, then drain clean
            store.advance(Duration::from_secs(600));
            store.recover(Duration::from_secs(0)).await.unwrap();
            store.advance(Duration::from_secs(1));
            worker.drain_once().await;
            worker.drain_once().await;

            let fast = store.stock_value(1).await.unwrap().unwrap();
            prop_assert_eq!(fast, initial, "task never settled to a single restore");
            Ok(())
        })?;
    }
}
