//! Completion job for download sessions
//!
//! Handlers never close a session inline. Once the response body is handed
//! to the transport, the outcome is queued here and a worker task applies
//! `complete`/`fail` with at-least-once semantics:
//!
//! - store errors are retried with exponential backoff
//! - `complete` and `fail` are idempotent, so a repeat is harmless
//! - a `TransferTicket` dropped before `finish` queues `fail("transfer aborted")`
//!
//! A crash before the queue drains leaves the session `downloading`; an
//! administrator reset or the lease recovers it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::AppError;

use super::state_machine::DownloadGuard;

/// Error message stored when a transfer ends before its last chunk
pub const TRANSFER_ABORTED: &str = "transfer aborted";

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
}

#[derive(Debug)]
struct Job {
    session_id: i64,
    outcome: Outcome,
}

/// Sender half of the completion job. Cheap to clone.
#[derive(Clone)]
pub struct CompletionQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl CompletionQueue {
    /// Create the queue and spawn its worker.
    ///
    /// The worker exits once every `CompletionQueue` clone has been dropped
    /// and the backlog is drained.
    pub fn spawn(guard: DownloadGuard) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(guard, rx));
        (Self { tx }, handle)
    }

    pub fn complete(&self, session_id: i64) {
        self.enqueue(session_id, Outcome::Completed);
    }

    pub fn fail(&self, session_id: i64, error_message: impl Into<String>) {
        self.enqueue(session_id, Outcome::Failed(error_message.into()));
    }

    /// Guard object for one in-flight transfer
    pub fn ticket(&self, session_id: i64) -> TransferTicket {
        TransferTicket {
            queue: self.clone(),
            session_id,
            settled: false,
        }
    }

    fn enqueue(&self, session_id: i64, outcome: Outcome) {
        if self.tx.send(Job { session_id, outcome }).is_err() {
            tracing::error!(session_id, "completion worker is gone, session left open");
        }
    }
}

/// Settles a download session exactly once.
///
/// `finish` queues completion and `abort` queues failure. Dropping the
/// ticket without either (client hung up, stream cancelled) queues
/// `fail(TRANSFER_ABORTED)`.
pub struct TransferTicket {
    queue: CompletionQueue,
    session_id: i64,
    settled: bool,
}

impl TransferTicket {
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn finish(mut self) {
        self.settled = true;
        self.queue.complete(self.session_id);
    }

    pub fn abort(mut self, error_message: impl Into<String>) {
        self.settled = true;
        self.queue.fail(self.session_id, error_message);
    }
}

impl Drop for TransferTicket {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(session_id = self.session_id, "transfer dropped before completion");
            self.queue.fail(self.session_id, TRANSFER_ABORTED);
        }
    }
}

async fn run_worker(guard: DownloadGuard, mut rx: mpsc::UnboundedReceiver<Job>) {
    tracing::debug!("completion worker started");
    while let Some(job) = rx.recv().await {
        apply_with_retry(&guard, job).await;
    }
    tracing::debug!("completion worker stopped");
}

async fn apply_with_retry(guard: &DownloadGuard, job: Job) {
    let mut delay = INITIAL_BACKOFF;
    for attempt in 1..=MAX_ATTEMPTS {
        let result = match &job.outcome {
            Outcome::Completed => guard.complete(job.session_id).await,
            Outcome::Failed(message) => guard.fail(job.session_id, message).await,
        };

        match result {
            Ok(changed) => {
                if !changed {
                    tracing::debug!(session_id = job.session_id, "session already settled");
                }
                return;
            }
            Err(AppError::NotFound { .. }) => {
                tracing::warn!(session_id = job.session_id, "completion for unknown session");
                return;
            }
            Err(e) if attempt < MAX_ATTEMPTS => {
                tracing::warn!(
                    session_id = job.session_id,
                    attempt,
                    error = %e,
                    backoff_ms = delay.as_millis() as u64,
                    "completion failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
            }
            Err(e) => {
                tracing::error!(
                    session_id = job.session_id,
                    outcome = ?job.outcome,
                    error = %e,
                    "giving up on session completion"
                );
            }
        }
    }
}
