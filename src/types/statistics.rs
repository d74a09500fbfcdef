//! Derived usage statistics

use serde::{Deserialize, Serialize};

/// Width of a trend bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Monthly,
}

impl Granularity {
    /// SQLite `strftime` pattern that truncates a timestamp to the bucket
    pub fn strftime_pattern(&self) -> &'static str {
        match self {
            Granularity::Daily => "%Y-%m-%d",
            Granularity::Monthly => "%Y-%m",
        }
    }
}

/// Event count for one bucket (`2024-03` or `2024-03-15`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub period: String,
    pub count: i64,
}

/// Branch name with the number of generations that used it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchUsage {
    pub branch: String,
    pub count: i64,
}

/// `{month, count}` pair as exposed by the statistics API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCount {
    pub month: String,
    pub count: i64,
}

/// `{date, count}` pair as exposed by the trend API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

impl From<Bucket> for MonthlyCount {
    fn from(b: Bucket) -> Self {
        Self {
            month: b.period,
            count: b.count,
        }
    }
}

impl From<Bucket> for DailyCount {
    fn from(b: Bucket) -> Self {
        Self {
            date: b.period,
            count: b.count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlySeries {
    pub generations: Vec<MonthlyCount>,
    pub downloads: Vec<MonthlyCount>,
}

/// Summary over an inclusive date window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatistics {
    pub generation_count: i64,
    pub download_count: i64,
    pub distinct_user_count: i64,
    pub branch_usage: Vec<BranchUsage>,
    pub monthly_series: MonthlySeries,
}

/// Time-bucketed counts, newest bucket first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Trend {
    pub generations: Vec<Bucket>,
    pub downloads: Vec<Bucket>,
}
