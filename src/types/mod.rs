//! Data types for the DataWeaver activity backend
//!
//! This module contains the records, sessions, statistics shapes and
//! principal types shared by every component.

mod principal;
mod record;
mod session;
mod statistics;

pub use principal::{Principal, Role, User, UserStatus};
pub use record::{
    DownloadEvent, GenerationEvent, LogRecord, NewGeneration, NewOperation, OperationEvent,
    Origin, ParameterRanges, DOWNLOAD_OPERATION, GENERATION_OPERATION, RESERVED_OPERATION_TYPES,
};
pub use session::{DownloadSession, DownloadStatus, Resource, SessionStatus};
pub use statistics::{
    BranchUsage, Bucket, DailyCount, Granularity, MonthlyCount, MonthlySeries, Trend,
    UsageStatistics,
};

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Page<T> {
    pub entries: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(entries: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if page_size > 0 {
            total / page_size + i64::from(total % page_size != 0)
        } else {
            0
        };
        Self {
            entries,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}
