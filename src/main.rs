//! flashmart server entry point.
//!
//! Wiring order: config, logging, PostgreSQL, Redis, repositories, the
//! coordination core, the three background workers, then the gateway.
//! Ctrl-c flips a watch channel; workers finish their current iteration
//! and the server drains before exit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use flashmart::auth::UserAuthService;
use flashmart::config::AppConfig;
use flashmart::db;
use flashmart::dq::DelayQueue;
use flashmart::gateway::{build_router, state::AppState};
use flashmart::logging::init_logging;
use flashmart::order::OrderCoordinator;
use flashmart::persistence::{
    schema, PgCartRepository, PgCommodityRepository, PgOrderRepository, PgUserRepository,
};
use flashmart::stock::StockCache;
use flashmart::store::RedisStore;
use flashmart::workers::{CancelWorker, DrainConfig, FlushWorker, RecoveryWorker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/config.yaml".to_string());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    let _log_guard = init_logging(&config.log);
    tracing::info!(config = %config_path, "flashmart starting");

    // Storage backends.
    let pool = db::connect(&config.database).await?;
    schema::ensure_schema(&pool).await?;
    let redis = Arc::new(RedisStore::connect(&config.redis.url).await?);

    // Repositories.
    let commodities: Arc<PgCommodityRepository> =
        Arc::new(PgCommodityRepository::new(pool.clone()));
    let orders = Arc::new(PgOrderRepository::new(pool.clone()));
    let carts = Arc::new(PgCartRepository::new(pool.clone()));
    let users = PgUserRepository::new(pool.clone());

    // Coordination core.
    let stock = Arc::new(StockCache::new(redis.clone(), commodities.clone()));
    let queue = Arc::new(DelayQueue::new(redis.clone()));
    let coordinator = Arc::new(OrderCoordinator::new(
        orders.clone(),
        commodities.clone(),
        stock.clone(),
        queue.clone(),
        config.workers.cancel_delay(),
    ));

    // Background workers.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let flush = FlushWorker::new(
        stock.clone(),
        config.workers.flush_period(),
        shutdown_rx.clone(),
    );
    tokio::spawn(flush.run());

    let drain = CancelWorker::new(
        queue.clone(),
        stock.clone(),
        orders.clone(),
        DrainConfig {
            period: config.workers.drain_period(),
            claim_batch: config.workers.claim_batch,
            claim_lease: config.workers.claim_lease(),
            ..DrainConfig::default()
        },
    );
    tokio::spawn(drain.run(shutdown_rx.clone()));

    let recovery = RecoveryWorker::new(
        queue.clone(),
        config.workers.recover_period(),
        config.workers.retry_delay(),
        shutdown_rx.clone(),
    );
    tokio::spawn(recovery.run());

    // Gateway.
    let auth = Arc::new(UserAuthService::new(
        users,
        config.auth.jwt_secret.clone(),
        config.auth.token_ttl_hours,
    ));
    let state = Arc::new(AppState {
        pool,
        coordinator,
        commodities,
        stock,
        carts,
        auth,
    });
    let router = build_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            // Give workers a beat to finish the iteration in flight.
            tokio::time::sleep(Duration::from_millis(200)).await;
        })
        .await?;

    tracing::info!("flashmart stopped");
    Ok(())
}
