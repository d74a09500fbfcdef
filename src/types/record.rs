//! Log record types
//!
//! Three origins feed the activity log: generic operation audit entries,
//! script-generation events and simple file downloads. They share an id
//! (monotonic per origin), an owning user and a timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation type recorded for a simple file download
pub const DOWNLOAD_OPERATION: &str = "download";

/// Operation type recorded for a script generation
pub const GENERATION_OPERATION: &str = "script_generation";

/// Generic operation types that duplicate a specialized record.
/// The merged feed never shows them.
pub const RESERVED_OPERATION_TYPES: [&str; 2] = [DOWNLOAD_OPERATION, GENERATION_OPERATION];

/// Source table of a log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Operation,
    Generation,
    Download,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Operation => "operation",
            Origin::Generation => "generation",
            Origin::Download => "download",
        }
    }

    /// Secondary sort key for records sharing a timestamp
    pub fn rank(&self) -> i64 {
        match self {
            Origin::Operation => 0,
            Origin::Generation => 1,
            Origin::Download => 2,
        }
    }
}

impl std::str::FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operation" => Ok(Origin::Operation),
            "generation" => Ok(Origin::Generation),
            "download" => Ok(Origin::Download),
            other => Err(format!("unknown log origin '{}'", other)),
        }
    }
}

/// The six integer ranges a generated script was parameterised with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParameterRanges {
    pub user_start_index: i64,
    pub user_max_index: i64,
    pub department_index: i64,
    pub users_per_department: i64,
    pub device_start_index: i64,
    pub device_max_index: i64,
}

/// Generic action audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEvent {
    pub id: i64,
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub operation_type: String,
    pub detail: Option<String>,
    pub result: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A script-generation action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationEvent {
    pub id: i64,
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub branch: String,
    pub parameter_ranges: ParameterRanges,
    pub file_name: String,
    pub occurred_at: DateTime<Utc>,
}

/// A simple file download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadEvent {
    pub id: i64,
    pub user_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub file_name: String,
    pub occurred_at: DateTime<Utc>,
}

/// One entry of the unified activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum LogRecord {
    Operation(OperationEvent),
    Generation(GenerationEvent),
    Download(DownloadEvent),
}

impl LogRecord {
    pub fn origin(&self) -> Origin {
        match self {
            LogRecord::Operation(_) => Origin::Operation,
            LogRecord::Generation(_) => Origin::Generation,
            LogRecord::Download(_) => Origin::Download,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            LogRecord::Operation(e) => e.id,
            LogRecord::Generation(e) => e.id,
            LogRecord::Download(e) => e.id,
        }
    }

    pub fn user_id(&self) -> i64 {
        match self {
            LogRecord::Operation(e) => e.user_id,
            LogRecord::Generation(e) => e.user_id,
            LogRecord::Download(e) => e.user_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LogRecord::Operation(e) => e.occurred_at,
            LogRecord::Generation(e) => e.occurred_at,
            LogRecord::Download(e) => e.occurred_at,
        }
    }

    /// Operation type as shown to callers; specialized origins report their reserved kind
    pub fn operation_type(&self) -> &str {
        match self {
            LogRecord::Operation(e) => &e.operation_type,
            LogRecord::Generation(_) => GENERATION_OPERATION,
            LogRecord::Download(_) => DOWNLOAD_OPERATION,
        }
    }
}

/// Input for appending a generic operation entry
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub user_id: i64,
    pub operation_type: String,
    pub detail: Option<String>,
    pub result: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl NewOperation {
    /// Successful operation happening now
    pub fn succeeded(user_id: i64, operation_type: &str, detail: impl Into<String>) -> Self {
        Self {
            user_id,
            operation_type: operation_type.to_string(),
            detail: Some(detail.into()),
            result: Some("success".to_string()),
            occurred_at: Utc::now(),
        }
    }

    /// Failed operation happening now
    pub fn failed(
        user_id: i64,
        operation_type: &str,
        detail: impl Into<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            user_id,
            operation_type: operation_type.to_string(),
            detail: Some(detail.into()),
            result: Some(format!("failed: {}", error)),
            occurred_at: Utc::now(),
        }
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

/// Input for appending a generation event
#[derive(Debug, Clone, Deserialize)]
pub struct NewGeneration {
    pub user_id: i64,
    pub branch: String,
    pub parameter_ranges: ParameterRanges,
    pub file_name: String,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_serializes_with_origin_tag() {
        let record = LogRecord::Download(DownloadEvent {
            id: 7,
            user_id: 3,
            username: Some("alice".to_string()),
            file_name: "branch_a.zip".to_string(),
            occurred_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        });

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["origin"], "download");
        assert_eq!(json["file_name"], "branch_a.zip");
        assert_eq!(record.operation_type(), "download");
    }

    #[test]
    fn test_origin_rank_is_distinct() {
        let ranks = [Origin::Operation.rank(), Origin::Generation.rank(), Origin::Download.rank()];
        assert_eq!(ranks, [0, 1, 2]);
        assert_eq!("generation".parse::<Origin>().unwrap(), Origin::Generation);
        assert!("other".parse::<Origin>().is_err());
    }
}
