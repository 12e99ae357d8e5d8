//! Claim-lease recovery worker.
//!
//! Tasks whose lease expired are moved from `processing` back into `ready`
//! with a retry delay, covering scheduler crashes mid-claim and
//! restorations that failed without an ack.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::dq::DelayQueue;

use super::ShutdownRx;

pub struct RecoveryWorker {
    queue: Arc<DelayQueue>,
    period: Duration,
    retry_delay: Duration,
    shutdown: ShutdownRx,
}

impl RecoveryWorker {
    pub fn new(
        queue: Arc<DelayQueue>,
        period: Duration,
        retry_delay: Duration,
        shutdown: ShutdownRx,
    ) -> Self {
        Self {
            queue,
            period,
            retry_delay,
            shutdown,
        }
    }

    pub async fn run(self) {
        info!(
            period_secs = self.period.as_secs(),
            retry_delay_secs = self.retry_delay.as_secs(),
            "recovery worker started"
        );
        let mut shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.queue.recover(self.retry_delay).await {
                        Ok(0) => {}
                        Ok(moved) => info!(moved, "recovered timed out tasks"),
                        Err(err) => error!(error = %err, "task recovery failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("recovery worker stopped");
                    return;
                }
            }
        }
    }
}
