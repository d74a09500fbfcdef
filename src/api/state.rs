//! Shared application state for HTTP handlers

use tokio::task::JoinHandle;

use crate::activity::LogUnifier;
use crate::api::auth::JwtAuth;
use crate::blob::LocalBlobStore;
use crate::config::Config;
use crate::export::Exporter;
use crate::guard::{CompletionQueue, DownloadGuard};
use crate::statistics::StatisticsAggregator;
use crate::store::Store;

/// Components shared by every request.
///
/// Each component holds its own clone of the `Store` handle; nothing here is
/// behind a lock.
pub struct AppState {
    pub store: Store,
    pub unifier: LogUnifier,
    pub aggregator: StatisticsAggregator,
    pub guard: DownloadGuard,
    /// Settles guarded download sessions after the body is handed off
    pub completions: CompletionQueue,
    pub exporter: Exporter,
    pub auth: JwtAuth,
    /// Blobs behind the resource center
    pub resources: LocalBlobStore,
    /// Generated scripts and exports
    pub outputs: LocalBlobStore,
}

impl AppState {
    /// Wire every component onto `store` and start the completion worker.
    ///
    /// The returned handle finishes once the state (and every queue clone)
    /// has been dropped and pending completions are applied.
    pub fn build(store: Store, config: &Config, auth: JwtAuth) -> (Self, JoinHandle<()>) {
        let unifier = LogUnifier::new(store.clone());
        let aggregator = StatisticsAggregator::new(store.clone(), config.stats_offset);
        let guard = DownloadGuard::new(store.clone(), config.download_lease);
        let (completions, worker) = CompletionQueue::spawn(guard.clone());

        let resources = LocalBlobStore::new(&config.resource_dir);
        let outputs = LocalBlobStore::new(&config.output_dir);
        let exporter = Exporter::new(unifier.clone(), aggregator.clone(), outputs.clone());

        let state = Self {
            store,
            unifier,
            aggregator,
            guard,
            completions,
            exporter,
            auth,
            resources,
            outputs,
        };
        (state, worker)
    }
}
