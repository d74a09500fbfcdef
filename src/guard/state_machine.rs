//! Persisted single-flight download state machine
//!
//! ```text
//! NoRecord ──begin──► Downloading ──complete──► Completed
//!                         │
//!                         └──fail / reset / lease──► Failed ──begin──► Downloading (new row)
//! ```
//!
//! `download_sessions` rows are the only authority. There is no in-process
//! lock table, so the invariant holds across restarts and across every
//! connection in the pool.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{AppError, AppResult};
use crate::store::{Store, DOWNLOAD_LIMIT_KEY};
use crate::types::{DownloadSession, DownloadStatus, SessionStatus};
use crate::utils::time::from_unix;

/// Error message stored on sessions failed by `reset_all`
pub const RESET_MESSAGE: &str = "reset by administrator";

/// Error message stored on sessions failed by lease expiry
pub const LEASE_EXPIRED_MESSAGE: &str = "download lease expired";

/// Inserts a `downloading` row only if the resource exists and either the
/// limit is disabled or the user has no `downloading` row. The flag is read
/// inside the same statement.
const BEGIN_SQL: &str = "INSERT INTO download_sessions (user_id, resource_id, status, created_at)
    SELECT ?, r.id, 'downloading', ? FROM resources r
    WHERE r.id = ? AND (
        COALESCE(
            (SELECT lower(config_value) FROM system_configs WHERE config_key = ?),
            'true'
        ) = 'false'
        OR NOT EXISTS (
            SELECT 1 FROM download_sessions s
            WHERE s.user_id = ? AND s.status = 'downloading'
        )
    )";

/// Gatekeeper for resource downloads
#[derive(Clone)]
pub struct DownloadGuard {
    store: Store,
    lease: Option<Duration>,
}

impl DownloadGuard {
    pub fn new(store: Store, lease: Option<Duration>) -> Self {
        Self { store, lease }
    }

    pub fn lease(&self) -> Option<Duration> {
        self.lease
    }

    /// Open a download session for `user_id` on `resource_id`.
    ///
    /// Returns the new session id, `Conflict` when the user already has a
    /// download in flight and the limit is on, or `NotFound` for an unknown
    /// resource. The resource's download counter moves with the insert.
    pub async fn begin(&self, user_id: i64, resource_id: i64) -> AppResult<i64> {
        self.begin_at(user_id, resource_id, Utc::now()).await
    }

    pub(crate) async fn begin_at(
        &self,
        user_id: i64,
        resource_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<i64> {
        let now_secs = now.timestamp();
        // The first statement of the transaction always writes, so SQLite
        // takes the write lock up front and the busy timeout applies.
        let mut tx = self.store.pool().begin().await?;

        if let Some(cutoff) = self.lease_cutoff(now) {
            let expired = sqlx::query(
                "UPDATE download_sessions
                 SET status = 'failed', error_message = ?, completed_at = ?
                 WHERE user_id = ? AND status = 'downloading' AND created_at < ?",
            )
            .bind(LEASE_EXPIRED_MESSAGE)
            .bind(now_secs)
            .bind(user_id)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if expired > 0 {
                tracing::warn!(user_id, expired, "expired stale download sessions");
            }
        }

        let inserted = sqlx::query(BEGIN_SQL)
            .bind(user_id)
            .bind(now_secs)
            .bind(resource_id)
            .bind(DOWNLOAD_LIMIT_KEY)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if inserted.rows_affected() == 0 {
            let resource_exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM resources WHERE id = ?)")
                    .bind(resource_id)
                    .fetch_one(&mut *tx)
                    .await?;
            let active_session: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM download_sessions
                 WHERE user_id = ? AND status = 'downloading'
                 ORDER BY created_at DESC, id DESC LIMIT 1",
            )
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
            // Keeps any lease expiry applied above
            tx.commit().await?;

            if !resource_exists {
                return Err(AppError::not_found("resource", resource_id));
            }
            tracing::info!(user_id, resource_id, ?active_session, "download refused");
            return Err(AppError::Conflict {
                user_id,
                active_session,
            });
        }

        let session_id = inserted.last_insert_rowid();
        sqlx::query("UPDATE resources SET download_count = download_count + 1 WHERE id = ?")
            .bind(resource_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(user_id, resource_id, session_id, "download session opened");
        Ok(session_id)
    }

    /// `Downloading → Completed`. Returns false if the session was already terminal.
    pub async fn complete(&self, session_id: i64) -> AppResult<bool> {
        self.transition(session_id, SessionStatus::Completed, None).await
    }

    /// `Downloading → Failed` with `error_message`. Returns false if already terminal.
    pub async fn fail(&self, session_id: i64, error_message: &str) -> AppResult<bool> {
        self.transition(session_id, SessionStatus::Failed, Some(error_message))
            .await
    }

    async fn transition(
        &self,
        session_id: i64,
        to: SessionStatus,
        error_message: Option<&str>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE download_sessions
             SET status = ?, error_message = COALESCE(?, error_message), completed_at = ?
             WHERE id = ? AND status = 'downloading'",
        )
        .bind(to.as_str())
        .bind(error_message)
        .bind(Utc::now().timestamp())
        .bind(session_id)
        .execute(self.store.pool())
        .await?;

        if result.rows_affected() > 0 {
            tracing::debug!(session_id, status = %to, "download session closed");
            return Ok(true);
        }

        match self.find_session(session_id).await? {
            Some(_) => Ok(false),
            None => Err(AppError::not_found("download session", session_id)),
        }
    }

    /// Projection of the user's most recent session
    pub async fn status_for_user(&self, user_id: i64) -> AppResult<DownloadStatus> {
        let row = sqlx::query(
            "SELECT * FROM download_sessions WHERE user_id = ?
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(self.store.pool())
        .await?;
        let session = row.as_ref().map(session_from_row).transpose()?;
        Ok(DownloadStatus::from_session(session.as_ref()))
    }

    /// Projection of the user's most recent session on one resource
    pub async fn status_for_resource(
        &self,
        user_id: i64,
        resource_id: i64,
    ) -> AppResult<DownloadStatus> {
        let row = sqlx::query(
            "SELECT * FROM download_sessions WHERE user_id = ? AND resource_id = ?
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(resource_id)
        .fetch_optional(self.store.pool())
        .await?;
        let session = row.as_ref().map(session_from_row).transpose()?;
        Ok(DownloadStatus::from_session(session.as_ref()))
    }

    /// Fail every `downloading` session. Returns the number of rows changed.
    pub async fn reset_all(&self) -> AppResult<u64> {
        let affected = sqlx::query(
            "UPDATE download_sessions
             SET status = 'failed', error_message = ?, completed_at = ?
             WHERE status = 'downloading'",
        )
        .bind(RESET_MESSAGE)
        .bind(Utc::now().timestamp())
        .execute(self.store.pool())
        .await?
        .rows_affected();

        tracing::info!(affected, "download sessions reset");
        Ok(affected)
    }

    /// Fail every `downloading` session older than the lease. No-op without a lease.
    pub async fn reclaim_expired(&self) -> AppResult<u64> {
        self.reclaim_expired_at(Utc::now()).await
    }

    pub(crate) async fn reclaim_expired_at(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let Some(cutoff) = self.lease_cutoff(now) else {
            return Ok(0);
        };
        let affected = sqlx::query(
            "UPDATE download_sessions
             SET status = 'failed', error_message = ?, completed_at = ?
             WHERE status = 'downloading' AND created_at < ?",
        )
        .bind(LEASE_EXPIRED_MESSAGE)
        .bind(now.timestamp())
        .bind(cutoff)
        .execute(self.store.pool())
        .await?
        .rows_affected();

        if affected > 0 {
            tracing::warn!(affected, "reclaimed expired download sessions");
        }
        Ok(affected)
    }

    pub async fn find_session(&self, session_id: i64) -> AppResult<Option<DownloadSession>> {
        let row = sqlx::query("SELECT * FROM download_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(self.store.pool())
            .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    fn lease_cutoff(&self, now: DateTime<Utc>) -> Option<i64> {
        self.lease.map(|lease| {
            let secs = i64::try_from(lease.as_secs()).unwrap_or(i64::MAX);
            now.timestamp().saturating_sub(secs)
        })
    }
}

fn session_from_row(row: &SqliteRow) -> AppResult<DownloadSession> {
    let status: String = row.try_get("status")?;
    let completed_at: Option<i64> = row.try_get("completed_at")?;
    Ok(DownloadSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        resource_id: row.try_get("resource_id")?,
        status: status.parse().map_err(AppError::Internal)?,
        error_message: row.try_get("error_message")?,
        created_at: from_unix(row.try_get("created_at")?),
        completed_at: completed_at.map(from_unix),
    })
}
