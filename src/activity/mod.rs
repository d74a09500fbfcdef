//! Activity Module for the unified log feed
//!
//! - `LogUnifier`: merges operation, generation and download logs into one
//!   ordered, filtered, paginated feed
//! - `LogFilter` / `PageRequest`: validated query inputs
//!
//! Generic operation rows of kind `download` or `script_generation` duplicate
//! a specialized record and never appear in the feed.

mod filter;
mod unifier;

pub use filter::{LogFilter, PageRequest};
pub use unifier::LogUnifier;
