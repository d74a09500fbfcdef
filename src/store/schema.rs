//! SQLite schema, applied idempotently at startup
//!
//! Timestamps are INTEGER Unix seconds. Roles and statuses are TEXT holding
//! the snake_case names of the corresponding enums.

pub(crate) const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        created_at INTEGER NOT NULL,
        last_login INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS operation_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users (id),
        operation_type TEXT NOT NULL,
        detail TEXT,
        result TEXT,
        occurred_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_operation_logs_occurred_at ON operation_logs (occurred_at)",
    "CREATE TABLE IF NOT EXISTS generation_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users (id),
        branch TEXT NOT NULL,
        user_start_index INTEGER NOT NULL,
        user_max_index INTEGER NOT NULL,
        department_index INTEGER NOT NULL,
        users_per_department INTEGER NOT NULL,
        device_start_index INTEGER NOT NULL,
        device_max_index INTEGER NOT NULL,
        file_name TEXT NOT NULL,
        occurred_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_generation_logs_occurred_at ON generation_logs (occurred_at)",
    "CREATE TABLE IF NOT EXISTS download_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users (id),
        file_name TEXT NOT NULL,
        occurred_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_download_logs_occurred_at ON download_logs (occurred_at)",
    "CREATE TABLE IF NOT EXISTS resources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        resource_name TEXT NOT NULL,
        file_name TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        created_by INTEGER NOT NULL REFERENCES users (id),
        created_at INTEGER NOT NULL,
        download_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS download_sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users (id),
        resource_id INTEGER NOT NULL REFERENCES resources (id),
        status TEXT NOT NULL CHECK (status IN ('downloading', 'completed', 'failed')),
        error_message TEXT,
        created_at INTEGER NOT NULL,
        completed_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_download_sessions_user_status ON download_sessions (user_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_download_sessions_created_at ON download_sessions (created_at)",
    "CREATE TABLE IF NOT EXISTS system_configs (
        config_key TEXT PRIMARY KEY,
        config_value TEXT NOT NULL,
        description TEXT,
        updated_at INTEGER NOT NULL
    )",
];

/// Settings inserted on first start; existing values are never overwritten
pub(crate) const DEFAULT_SETTINGS: &[(&str, &str, &str)] = &[(
    DOWNLOAD_LIMIT_KEY,
    "true",
    "Allow at most one in-flight resource download per user",
)];

pub const DOWNLOAD_LIMIT_KEY: &str = "enable_download_limit";
