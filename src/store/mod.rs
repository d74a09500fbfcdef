//! Store Module for persistent records
//!
//! - `Store`: pooled SQLite handle with append-only log writes
//! - `schema`: table definitions applied at startup
//!
//! # Tables
//!
//! ```text
//! operation_logs ─┐
//! generation_logs ├──► activity::LogUnifier (merged feed)
//! download_logs ──┘    statistics::StatisticsAggregator
//! download_sessions ──► guard::DownloadGuard (sole writer)
//! resources, users, system_configs
//! ```

mod schema;
mod sqlite;

pub use schema::DOWNLOAD_LIMIT_KEY;
pub use sqlite::{Setting, Store};
