//! Store - persistent home of every log record, session and setting
//!
//! The store wraps one `SqlitePool`. Components receive a cloned handle and
//! never reach for a process-wide connection. Download sessions are not
//! written here; only `guard::DownloadGuard` mutates them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use crate::types::{NewGeneration, NewOperation, Resource, Role, User, UserStatus};
use crate::utils::time::from_unix;

use super::schema::{DEFAULT_SETTINGS, DOWNLOAD_LIMIT_KEY, SCHEMA};

/// One row of `system_configs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Setting {
    pub config_key: String,
    pub config_value: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Handle to the SQLite database
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database file and apply the schema
    pub async fn open(config: &DatabaseConfig) -> AppResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(
            path = %config.path.display(),
            max_connections = config.max_connections,
            "store opened"
        );
        Ok(store)
    }

    /// Wrap an existing pool (schema is not applied)
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables, indexes and default settings if missing
    pub async fn migrate(&self) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        let now = Utc::now().timestamp();
        for (key, value, description) in DEFAULT_SETTINGS {
            sqlx::query(
                "INSERT OR IGNORE INTO system_configs (config_key, config_value, description, updated_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(key)
            .bind(value)
            .bind(description)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Check database connectivity
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ---- users -----------------------------------------------------------

    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
        status: UserStatus,
    ) -> AppResult<i64> {
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, role, status, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(status.as_str())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::invalid(format!("username '{}' is already taken", username))
            }
            other => other.into(),
        })?;
        Ok(result.last_insert_rowid())
    }

    pub async fn find_user_by_name(&self, username: &str) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn find_user(&self, user_id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn has_role(&self, role: Role) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE role = ?)")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    pub async fn touch_last_login(&self, user_id: i64) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- append-only logs ------------------------------------------------

    /// Append a generic operation entry
    pub async fn record_operation(&self, op: &NewOperation) -> AppResult<i64> {
        let result = sqlx::query(
            "INSERT INTO operation_logs (user_id, operation_type, detail, result, occurred_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(op.user_id)
        .bind(&op.operation_type)
        .bind(&op.detail)
        .bind(&op.result)
        .bind(op.occurred_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Append a generic operation entry, logging instead of failing.
    ///
    /// Audit writes accompany a primary action whose outcome must not depend
    /// on the audit trail.
    pub async fn audit(&self, op: NewOperation) {
        if let Err(e) = self.record_operation(&op).await {
            tracing::error!(
                user_id = op.user_id,
                operation_type = %op.operation_type,
                error = %e,
                "failed to record operation"
            );
        }
    }

    /// Append a script-generation event
    pub async fn record_generation(&self, event: &NewGeneration) -> AppResult<i64> {
        let ranges = &event.parameter_ranges;
        let result = sqlx::query(
            "INSERT INTO generation_logs (
                user_id, branch, user_start_index, user_max_index, department_index,
                users_per_department, device_start_index, device_max_index, file_name, occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.user_id)
        .bind(&event.branch)
        .bind(ranges.user_start_index)
        .bind(ranges.user_max_index)
        .bind(ranges.department_index)
        .bind(ranges.users_per_department)
        .bind(ranges.device_start_index)
        .bind(ranges.device_max_index)
        .bind(&event.file_name)
        .bind(event.occurred_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Append a simple file-download event
    pub async fn record_download(
        &self,
        user_id: i64,
        file_name: &str,
        occurred_at: DateTime<Utc>,
    ) -> AppResult<i64> {
        let result = sqlx::query(
            "INSERT INTO download_logs (user_id, file_name, occurred_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(file_name)
        .bind(occurred_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    // ---- resources -------------------------------------------------------

    /// Register a blob already present in resource storage
    pub async fn register_resource(
        &self,
        resource_name: &str,
        file_name: &str,
        file_size: i64,
        created_by: i64,
    ) -> AppResult<Resource> {
        let created_at = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO resources (resource_name, file_name, file_size, created_by, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(resource_name)
        .bind(file_name)
        .bind(file_size)
        .bind(created_by)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Resource {
            id: result.last_insert_rowid(),
            resource_name: resource_name.to_string(),
            file_name: file_name.to_string(),
            file_size,
            created_by,
            created_at: from_unix(created_at),
            download_count: 0,
        })
    }

    pub async fn find_resource(&self, resource_id: i64) -> AppResult<Option<Resource>> {
        let row = sqlx::query("SELECT * FROM resources WHERE id = ?")
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(resource_from_row).transpose()
    }

    // ---- settings --------------------------------------------------------

    pub async fn list_settings(&self) -> AppResult<Vec<Setting>> {
        let rows = sqlx::query("SELECT * FROM system_configs ORDER BY config_key")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(setting_from_row).collect()
    }

    pub async fn get_setting(&self, key: &str) -> AppResult<Option<Setting>> {
        let row = sqlx::query("SELECT * FROM system_configs WHERE config_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(setting_from_row).transpose()
    }

    /// Update an existing setting; unknown keys are `NotFound`
    pub async fn update_setting(&self, key: &str, value: &str) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE system_configs SET config_value = ?, updated_at = ? WHERE config_key = ?",
        )
        .bind(value)
        .bind(Utc::now().timestamp())
        .bind(key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("setting", key));
        }
        Ok(())
    }

    /// Whether the single-flight download limit is on (defaults to on)
    pub async fn download_limit_enabled(&self) -> AppResult<bool> {
        let value = self.get_setting(DOWNLOAD_LIMIT_KEY).await?;
        Ok(value.map_or(true, |s| !s.config_value.eq_ignore_ascii_case("false")))
    }
}

fn decode_enum<T: FromStr<Err = String>>(raw: &str) -> AppResult<T> {
    raw.parse::<T>()
        .map_err(|e| AppError::Internal(format!("corrupt row: {}", e)))
}

fn user_from_row(row: &SqliteRow) -> AppResult<User> {
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;
    let last_login: Option<i64> = row.try_get("last_login")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role: decode_enum(&role)?,
        status: decode_enum(&status)?,
        created_at: from_unix(row.try_get("created_at")?),
        last_login: last_login.map(from_unix),
    })
}

fn resource_from_row(row: &SqliteRow) -> AppResult<Resource> {
    Ok(Resource {
        id: row.try_get("id")?,
        resource_name: row.try_get("resource_name")?,
        file_name: row.try_get("file_name")?,
        file_size: row.try_get("file_size")?,
        created_by: row.try_get("created_by")?,
        created_at: from_unix(row.try_get("created_at")?),
        download_count: row.try_get("download_count")?,
    })
}

fn setting_from_row(row: &SqliteRow) -> AppResult<Setting> {
    Ok(Setting {
        config_key: row.try_get("config_key")?,
        config_value: row.try_get("config_value")?,
        description: row.try_get("description")?,
        updated_at: from_unix(row.try_get("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = DatabaseConfig::new(temp_dir.path().join("weaver.db"));
        let store = Store::open(&config).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let (store, _dir) = open_store().await;
        store.migrate().await.unwrap();
        store.health_check().await.unwrap();
        assert!(store.download_limit_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_user_round_trip() {
        let (store, _dir) = open_store().await;
        let id = store
            .create_user("alice", "hash", Role::Operator, UserStatus::Active)
            .await
            .unwrap();

        let user = store.find_user_by_name("alice").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Operator);
        assert_eq!(user.status, UserStatus::Active);
        assert!(store.find_user(id + 100).await.unwrap().is_none());

        let duplicate = store
            .create_user("alice", "hash", Role::Admin, UserStatus::Active)
            .await;
        assert!(matches!(duplicate, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_download_limit_setting() {
        let (store, _dir) = open_store().await;
        store.update_setting(DOWNLOAD_LIMIT_KEY, "FALSE").await.unwrap();
        assert!(!store.download_limit_enabled().await.unwrap());

        store.update_setting(DOWNLOAD_LIMIT_KEY, "true").await.unwrap();
        assert!(store.download_limit_enabled().await.unwrap());

        let missing = store.update_setting("no_such_key", "1").await;
        assert!(matches!(missing, Err(AppError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_register_and_find_resource() {
        let (store, _dir) = open_store().await;
        let owner = store
            .create_user("admin", "hash", Role::SuperAdmin, UserStatus::Active)
            .await
            .unwrap();

        let resource = store
            .register_resource("quarterly-dataset", "quarterly.zip", 2048, owner)
            .await
            .unwrap();
        let found = store.find_resource(resource.id).await.unwrap().unwrap();
        assert_eq!(found, resource);
        assert_eq!(found.download_count, 0);
    }
}
