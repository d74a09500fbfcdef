//! Statistics Module for usage summaries and trends
//!
//! - `StatisticsAggregator::summary`: counts, distinct users, branch ranking
//! - `StatisticsAggregator::trend`: daily or monthly buckets, newest first

mod aggregator;

pub use aggregator::StatisticsAggregator;
