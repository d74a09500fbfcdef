//! Guard Module for single-flight resource downloads
//!
//! - `DownloadGuard`: persisted per-user state machine (begin, complete,
//!   fail, status, reset, lease reclaim)
//! - `CompletionQueue` / `TransferTicket`: background settlement of sessions
//!   after the response body is handed off
//! - `spawn_lease_sweeper`: periodic `reclaim_expired` when a lease is set

mod completion;
mod state_machine;

use std::time::Duration;

use tokio::task::JoinHandle;

pub use completion::{CompletionQueue, Outcome, TransferTicket, TRANSFER_ABORTED};
pub use state_machine::{DownloadGuard, LEASE_EXPIRED_MESSAGE, RESET_MESSAGE};

/// Run `reclaim_expired` every `interval`. Returns `None` when no lease is configured.
pub fn spawn_lease_sweeper(guard: DownloadGuard, interval: Duration) -> Option<JoinHandle<()>> {
    let lease = guard.lease()?;
    tracing::info!(
        lease_secs = lease.as_secs(),
        interval_secs = interval.as_secs(),
        "download lease sweeper started"
    );

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = guard.reclaim_expired().await {
                tracing::error!(error = %e, "lease sweep failed");
            }
        }
    }))
}
