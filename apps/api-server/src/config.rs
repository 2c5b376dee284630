//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated once at startup to fail
//! fast on misconfiguration rather than at request time. Nothing is reloaded.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::level_filters::LevelFilter;

/// Storage backend provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
    /// PostgreSQL via a connection pool
    Postgres,
}

impl StorageProvider {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
#[error("Configuration error for {field}: {message}")]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name, reported at startup (default: user-service)
    pub app_name: String,
    /// Deployment environment label (default: development)
    pub app_env: String,
    /// Server port (default: 8080)
    pub port: u16,
    /// Default log level when RUST_LOG is unset (default: info)
    pub log_level: LevelFilter,
    /// Log format
    pub log_format: LogFormat,
    /// Storage provider (default: memory)
    pub storage_provider: StorageProvider,
    /// SQLite database path
    pub db_path: PathBuf,
    /// Postgres connection string (required for postgres storage)
    pub database_url: Option<String>,
    /// Postgres pool size (default: 5)
    pub db_max_connections: u32,
    /// Per-request deadline for service calls (default: 5000 ms)
    pub request_timeout: Duration,
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_name = get("APP_NAME").unwrap_or_else(|| "user-service".into());
        let app_env = get("APP_ENV").unwrap_or_else(|| "development".into());

        let port = parse_or("PORT", get("PORT"), 8080u16)?;

        let log_level = parse_or("LOG_LEVEL", get("LOG_LEVEL"), LevelFilter::INFO)?;

        let log_format = LogFormat::parse(&get("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        let provider_str = get("STORAGE_PROVIDER").unwrap_or_else(|| "memory".into());
        let storage_provider = StorageProvider::parse(&provider_str).ok_or_else(|| ConfigError {
            field: "STORAGE_PROVIDER",
            message: format!(
                "unknown provider '{}', expected memory, sqlite or postgres",
                provider_str
            ),
        })?;

        let db_path = get("DB_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/users.db"));

        let database_url = get("DATABASE_URL").filter(|s| !s.is_empty());
        if storage_provider == StorageProvider::Postgres && database_url.is_none() {
            return Err(ConfigError {
                field: "DATABASE_URL",
                message: "Required when STORAGE_PROVIDER=postgres".into(),
            });
        }

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", get("DB_MAX_CONNECTIONS"), 5u32)?;
        if db_max_connections == 0 {
            return Err(ConfigError {
                field: "DB_MAX_CONNECTIONS",
                message: "must be at least 1".into(),
            });
        }

        let timeout_ms = parse_or("REQUEST_TIMEOUT_MS", get("REQUEST_TIMEOUT_MS"), 5000u64)?;
        if timeout_ms == 0 {
            return Err(ConfigError {
                field: "REQUEST_TIMEOUT_MS",
                message: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            app_name,
            app_env,
            port,
            log_level,
            log_format,
            storage_provider,
            db_path,
            database_url,
            db_max_connections,
            request_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Parse an optional raw value, falling back to `default` when unset.
fn parse_or<T>(field: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|e| ConfigError {
            field,
            message: format!("Invalid value '{}': {}", s, e),
        }),
    }
}
