//! DataWeaver activity backend
//!
//! Records what users do with the script generator and its resource center,
//! and answers questions about it.
//!
//! # Features
//!
//! - **Unified feed**: operation, generation and download logs merged into one
//!   de-duplicated, filtered, paginated view
//! - **Statistics**: usage summary plus daily and monthly trends in a fixed
//!   reporting timezone
//! - **Download guard**: persisted single-flight state machine, at most one
//!   in-flight resource download per user
//! - **Export**: zip archives of feeds and statistics
//!
//! # Modules
//!
//! - `types`: Core data structures (LogRecord, DownloadSession, UsageStatistics)
//! - `store`: SQLite persistence via `sqlx`
//! - `activity`: `LogUnifier` and its query inputs
//! - `statistics`: `StatisticsAggregator`
//! - `guard`: `DownloadGuard` and its completion queue
//! - `export`: zip export
//! - `blob`: local directory blob storage
//! - `api`: axum router, JWT auth and REST handlers
//! - `config`, `logging`, `utils`: environment configuration, tracing setup, time helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dataweaver::api::{auth::JwtAuth, create_router, AppState};
//! use dataweaver::{Config, Store};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let store = Store::open(&config.database).await?;
//! let auth = JwtAuth::from_config(&config.auth)?;
//! let (state, _worker) = AppState::build(store, &config, auth);
//! let app = create_router(Arc::new(state));
//! let listener = tokio::net::TcpListener::bind(config.bind).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod api;
pub mod blob;
pub mod config;
pub mod error;
pub mod export;
pub mod guard;
pub mod logging;
pub mod statistics;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use activity::{LogFilter, LogUnifier, PageRequest};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use guard::DownloadGuard;
pub use statistics::StatisticsAggregator;
pub use store::Store;
pub use types::{
    DownloadStatus, Granularity, LogRecord, Page, Principal, Role, UsageStatistics,
};
pub use utils::DateWindow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
