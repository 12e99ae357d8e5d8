//! Background workers.
//!
//! Three ticker-driven loops cooperate with the stock cache and the delay
//! queue: the flush worker writes the delta ledger back to the durable
//! store, the cancel worker drains due cancellation tasks, and the
//! recovery worker requeues expired-lease claims. Each loop selects
//! between its ticker and a shutdown signal, finishing the iteration in
//! flight before exiting. Per-task failures are logged, never propagated.

pub mod cancel;
pub mod flush;
pub mod recovery;

pub use cancel::{CancelWorker, DrainConfig};
pub use flush::FlushWorker;
pub use recovery::RecoveryWorker;

/// Shutdown signal shared by all workers. Senders flip the value once;
/// receivers exit after their current iteration.
pub type ShutdownRx = tokio::sync::watch::Receiver<bool>;
