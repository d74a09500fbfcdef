//! Download session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted state of one download attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Downloading,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Downloading => "downloading",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Downloading)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloading" => Ok(SessionStatus::Downloading),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// One row of `download_sessions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadSession {
    pub id: i64,
    pub user_id: i64,
    pub resource_id: i64,
    pub status: SessionStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Read-only projection of a user's most recent session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadStatus {
    NoRecord,
    Downloading {
        session_id: i64,
        resource_id: i64,
    },
    Failed {
        session_id: i64,
        error_message: Option<String>,
        can_retry: bool,
    },
    Completed {
        session_id: i64,
    },
}

impl DownloadStatus {
    pub fn from_session(session: Option<&DownloadSession>) -> Self {
        match session {
            None => DownloadStatus::NoRecord,
            Some(s) => match s.status {
                SessionStatus::Downloading => DownloadStatus::Downloading {
                    session_id: s.id,
                    resource_id: s.resource_id,
                },
                SessionStatus::Failed => DownloadStatus::Failed {
                    session_id: s.id,
                    error_message: s.error_message.clone(),
                    can_retry: true,
                },
                SessionStatus::Completed => DownloadStatus::Completed { session_id: s.id },
            },
        }
    }

    /// Human-readable summary for API responses
    pub fn message(&self) -> &'static str {
        match self {
            DownloadStatus::NoRecord => "no download record",
            DownloadStatus::Downloading { .. } => "download in progress",
            DownloadStatus::Failed { .. } => "download failed",
            DownloadStatus::Completed { .. } => "download completed",
        }
    }
}

/// A downloadable blob registered in the resource center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub resource_name: String,
    pub file_name: String,
    pub file_size: i64,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub download_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(status: SessionStatus) -> DownloadSession {
        DownloadSession {
            id: 11,
            user_id: 1,
            resource_id: 5,
            status,
            error_message: Some("reset by administrator".to_string()),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_status_projection() {
        assert_eq!(DownloadStatus::from_session(None), DownloadStatus::NoRecord);

        let downloading = DownloadStatus::from_session(Some(&session(SessionStatus::Downloading)));
        assert_eq!(
            downloading,
            DownloadStatus::Downloading { session_id: 11, resource_id: 5 }
        );

        let failed = DownloadStatus::from_session(Some(&session(SessionStatus::Failed)));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["can_retry"], true);
        assert_eq!(json["error_message"], "reset by administrator");
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [SessionStatus::Downloading, SessionStatus::Completed, SessionStatus::Failed] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!(SessionStatus::Completed.is_terminal());
        assert!(!SessionStatus::Downloading.is_terminal());
    }
}
