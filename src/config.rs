//! Runtime configuration
//!
//! All settings come from `WEAVER_*` environment variables:
//!
//! ```bash
//! WEAVER_DATABASE_PATH=data/dataweaver.db
//! WEAVER_BIND=0.0.0.0:10010
//! WEAVER_JWT_SECRET=your-super-secret-key-at-least-32-chars
//! WEAVER_ADMIN_PASSWORD=change-me
//! WEAVER_ACCESS_TOKEN_TTL=28800
//! WEAVER_REFRESH_TOKEN_TTL=604800
//! WEAVER_RESOURCE_DIR=resource_center
//! WEAVER_OUTPUT_DIR=output
//! WEAVER_STATS_UTC_OFFSET=+08:00
//! WEAVER_DOWNLOAD_LEASE_SECS=3600
//! WEAVER_DB_MAX_CONNECTIONS=5
//! WEAVER_LOG_FORMAT=json
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use crate::utils::time::{parse_utc_offset, utc_offset};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Settings for the SQLite store
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Token settings. The secret is resolved by `api::auth::JwtAuth`.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    /// Password of the bootstrap super admin created on an empty database
    pub admin_password: Option<String>,
    pub access_token_ttl: i64,
    pub refresh_token_ttl: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            admin_password: None,
            access_token_ttl: 8 * 3600,
            refresh_token_ttl: 7 * 24 * 3600,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    /// Blobs served by the resource center
    pub resource_dir: PathBuf,
    /// Generated scripts and exports served by `/download`
    pub output_dir: PathBuf,
    /// Fixed timezone for date filters and statistics buckets
    pub stats_offset: FixedOffset,
    /// Age after which a `downloading` session is reclaimed; `None` keeps sessions until reset
    pub download_lease: Option<Duration>,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 10010)),
            database: DatabaseConfig::new("dataweaver.db"),
            auth: AuthConfig::default(),
            resource_dir: PathBuf::from("resource_center"),
            output_dir: PathBuf::from("output"),
            stats_offset: utc_offset(),
            download_lease: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Build configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(path) = lookup("WEAVER_DATABASE_PATH") {
            config.database.path = PathBuf::from(path);
        }
        if let Some(value) = lookup("WEAVER_DB_MAX_CONNECTIONS") {
            let max: u32 = parse_number("WEAVER_DB_MAX_CONNECTIONS", &value)?;
            if max == 0 {
                return Err(ConfigError::invalid(
                    "WEAVER_DB_MAX_CONNECTIONS",
                    &value,
                    "must be at least 1",
                ));
            }
            config.database.max_connections = max;
        }
        if let Some(value) = lookup("WEAVER_BIND") {
            config.bind = value
                .parse()
                .map_err(|e| ConfigError::invalid("WEAVER_BIND", &value, format!("{}", e)))?;
        }

        config.auth.jwt_secret = lookup("WEAVER_JWT_SECRET");
        config.auth.admin_password = lookup("WEAVER_ADMIN_PASSWORD");
        if let Some(value) = lookup("WEAVER_ACCESS_TOKEN_TTL") {
            config.auth.access_token_ttl = parse_number("WEAVER_ACCESS_TOKEN_TTL", &value)?;
        }
        if let Some(value) = lookup("WEAVER_REFRESH_TOKEN_TTL") {
            config.auth.refresh_token_ttl = parse_number("WEAVER_REFRESH_TOKEN_TTL", &value)?;
        }

        if let Some(dir) = lookup("WEAVER_RESOURCE_DIR") {
            config.resource_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("WEAVER_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("WEAVER_STATS_UTC_OFFSET") {
            config.stats_offset = parse_utc_offset(&value)
                .map_err(|reason| ConfigError::invalid("WEAVER_STATS_UTC_OFFSET", &value, reason))?;
        }
        if let Some(value) = lookup("WEAVER_DOWNLOAD_LEASE_SECS") {
            let secs: u64 = parse_number("WEAVER_DOWNLOAD_LEASE_SECS", &value)?;
            // 0 disables the lease
            config.download_lease = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(value) = lookup("WEAVER_LOG_FORMAT") {
            config.log_format = match value.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" | "text" => LogFormat::Pretty,
                _ => {
                    return Err(ConfigError::invalid(
                        "WEAVER_LOG_FORMAT",
                        &value,
                        "expected 'json' or 'pretty'",
                    ))
                }
            };
        }

        Ok(config)
    }
}

fn parse_number<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(name, value, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind.port(), 10010);
        assert_eq!(config.database.max_connections, 5);
        assert!(config.download_lease.is_none());
        assert_eq!(config.stats_offset.local_minus_utc(), 0);
    }

    #[test]
    fn test_reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("WEAVER_BIND", "127.0.0.1:8080"),
            ("WEAVER_STATS_UTC_OFFSET", "+08:00"),
            ("WEAVER_DOWNLOAD_LEASE_SECS", "900"),
            ("WEAVER_LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.stats_offset.local_minus_utc(), 8 * 3600);
        assert_eq!(config.download_lease, Some(Duration::from_secs(900)));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_zero_lease_disables_expiry() {
        let config =
            Config::from_lookup(lookup_from(&[("WEAVER_DOWNLOAD_LEASE_SECS", "0")])).unwrap();
        assert!(config.download_lease.is_none());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_lookup(lookup_from(&[("WEAVER_BIND", "nowhere")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("WEAVER_DB_MAX_CONNECTIONS", "0")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("WEAVER_STATS_UTC_OFFSET", "8")])).is_err());
    }
}
