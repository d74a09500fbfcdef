//! Utility functions and helpers
//!
//! This module contains timestamp and date-window helpers.

pub mod time;

pub use time::{current_timestamp, from_unix, parse_date, parse_utc_offset, DateWindow};
