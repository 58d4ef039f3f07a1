//! Configuration handling for the access layer.
//!
//! Pool sizing and connection components come from CLI arguments and
//! environment variables; per-handle behaviour (retry limits, batching) lives
//! in [`DbOptions`].

use crate::error::{DbError, DbResult};
use crate::models::IsolationLevel;
use clap::{Args, Parser, Subcommand};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_DATABASE: &str = "taskdb";
pub const DEFAULT_USER: &str = "user";
pub const DEFAULT_PASSWORD: &str = "password";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 3600;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

// Access layer defaults
pub const DEFAULT_MAX_RETRIES: u32 = 10;
pub const DEFAULT_INITIAL_RETRY_BACKOFF: Duration = Duration::from_millis(125);
pub const DEFAULT_MAX_BULK_UPDATE_ARRAY_LEN: usize = 10_000;
/// Postgres encodes the parameter count of a statement as an int16.
pub const DEFAULT_MAX_BIND_PARAMS: usize = 65_535;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 4)
    pub max_connections: Option<u32>,
    /// Minimum connections kept open (default: 0)
    pub min_connections: Option<u32>,
    /// Seconds after creation at which a connection is retired (default: 3600)
    pub max_lifetime_secs: Option<u64>,
    /// Seconds an idle connection may linger before it is closed (default: 1800)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Pool option keys that we extract from URL query parameters.
    const URL_KEYS: &'static [&'static str] = &[
        "max_connections",
        "min_connections",
        "max_lifetime",
        "idle_timeout",
        "acquire_timeout",
        "test_before_acquire",
    ];

    pub fn max_connections_or_default(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn max_lifetime_or_default(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs.unwrap_or(DEFAULT_MAX_LIFETIME_SECS))
    }

    pub fn idle_timeout_or_default(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options.
    pub fn validate(&self) -> DbResult<()> {
        let max = self.max_connections_or_default();
        let min = self.min_connections_or_default();
        if max == 0 {
            return Err(DbError::invalid_input(
                "max_connections must be greater than 0",
            ));
        }
        if min > max {
            return Err(DbError::invalid_input(format!(
                "min_connections ({}) cannot exceed max_connections ({})",
                min, max
            )));
        }
        Ok(())
    }

    /// Split pool options out of a connection URL's query string, leaving
    /// every other parameter for the driver.
    ///
    /// Explicit values in `self` win over values found in the URL.
    pub fn merge_from_url(&self, connection_string: &str) -> DbResult<(String, PoolOptions)> {
        let mut url = Url::parse(connection_string)
            .map_err(|e| DbError::invalid_input(format!("Invalid connection URL: {e}")))?;
        let mut opts = extract_options(&mut url, Self::URL_KEYS);

        let parsed = PoolOptions {
            max_connections: opts.remove("max_connections").and_then(|v| v.parse().ok()),
            min_connections: opts.remove("min_connections").and_then(|v| v.parse().ok()),
            max_lifetime_secs: opts.remove("max_lifetime").and_then(|v| v.parse().ok()),
            idle_timeout_secs: opts.remove("idle_timeout").and_then(|v| v.parse().ok()),
            acquire_timeout_secs: opts.remove("acquire_timeout").and_then(|v| v.parse().ok()),
            test_before_acquire: opts.remove("test_before_acquire").and_then(|v| {
                if v.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if v.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None // Invalid value ignored
                }
            }),
        };

        let merged = PoolOptions {
            max_connections: self.max_connections.or(parsed.max_connections),
            min_connections: self.min_connections.or(parsed.min_connections),
            max_lifetime_secs: self.max_lifetime_secs.or(parsed.max_lifetime_secs),
            idle_timeout_secs: self.idle_timeout_secs.or(parsed.idle_timeout_secs),
            acquire_timeout_secs: self.acquire_timeout_secs.or(parsed.acquire_timeout_secs),
            test_before_acquire: self.test_before_acquire.or(parsed.test_before_acquire),
        };
        merged.validate()?;
        Ok((url.to_string(), merged))
    }
}

/// Extract our options from URL query params, keeping others for the driver.
/// Uses proper URL encoding to preserve special characters in remaining params.
fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
    let mut opts = HashMap::new();
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(k, v)| {
            let key_lower = k.to_ascii_lowercase();
            if keys.contains(&key_lower.as_str()) {
                opts.insert(key_lower, v.into_owned());
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();

    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(remaining);
    }
    opts
}

/// Immutable per-handle behaviour of the access layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DbOptions {
    /// Isolation used by bulk operations that open their own transaction.
    pub default_isolation: IsolationLevel,
    /// Serialization failures tolerated before giving up.
    pub max_retries: u32,
    /// Sleep before the first retry; doubled after each further failure.
    pub initial_retry_backoff: Duration,
    /// Longest array bound to a single bulk update statement.
    pub max_bulk_update_array_len: usize,
    /// Most placeholders a single bulk insert statement may carry.
    pub max_bind_params: usize,
    /// Deadline applied to every operation, in addition to any cancellation.
    pub statement_timeout: Option<Duration>,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            default_isolation: IsolationLevel::Default,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_retry_backoff: DEFAULT_INITIAL_RETRY_BACKOFF,
            max_bulk_update_array_len: DEFAULT_MAX_BULK_UPDATE_ARRAY_LEN,
            max_bind_params: DEFAULT_MAX_BIND_PARAMS,
            statement_timeout: None,
        }
    }
}

impl DbOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_retry_backoff(mut self, backoff: Duration) -> Self {
        self.initial_retry_backoff = backoff;
        self
    }

    pub fn with_max_bulk_update_array_len(mut self, len: usize) -> Self {
        self.max_bulk_update_array_len = len;
        self
    }

    pub fn with_max_bind_params(mut self, n: usize) -> Self {
        self.max_bind_params = n;
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Validate option values.
    pub fn validate(&self) -> DbResult<()> {
        if self.max_bulk_update_array_len == 0 {
            return Err(DbError::invalid_input(
                "max_bulk_update_array_len must be greater than 0",
            ));
        }
        if self.max_bind_params == 0 {
            return Err(DbError::invalid_input(
                "max_bind_params must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Connection components and pool sizing, read from flags or environment.
#[derive(Debug, Clone, Args)]
pub struct DbConfig {
    /// Database server host
    #[arg(long = "db-host", default_value = DEFAULT_HOST, env = "POSTGRES_HOST")]
    pub host: String,

    /// Database server port
    #[arg(long = "db-port", default_value_t = DEFAULT_PORT, env = "POSTGRES_PORT")]
    pub port: u16,

    /// Database name
    #[arg(long = "db-name", default_value = DEFAULT_DATABASE, env = "POSTGRES_DATABASE")]
    pub database: String,

    /// Database user
    #[arg(long = "db-user", default_value = DEFAULT_USER, env = "POSTGRES_USER")]
    pub user: String,

    /// Database password (sensitive - not logged)
    #[arg(
        long = "db-password",
        default_value = DEFAULT_PASSWORD,
        env = "POSTGRES_PASSWORD",
        hide_env_values = true
    )]
    pub password: String,

    /// Maximum size of the connection pool
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS, env = "POSTGRES_MAX_CONNS")]
    pub max_conns: u32,

    /// Minimum number of idle connections kept open
    #[arg(long, default_value_t = DEFAULT_MIN_CONNECTIONS, env = "POSTGRES_MIN_CONNS")]
    pub min_conns: u32,

    /// Seconds after which a connection is retired
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_LIFETIME_SECS,
        env = "POSTGRES_MAX_CONN_LIFETIME"
    )]
    pub max_conn_lifetime: u64,

    /// Seconds after which an idle connection is closed
    #[arg(
        long,
        default_value_t = DEFAULT_IDLE_TIMEOUT_SECS,
        env = "POSTGRES_MAX_CONN_IDLE_TIME"
    )]
    pub max_conn_idle_time: u64,

    /// Instance identifier used to prefix query IDs in logs
    #[arg(long, env = "INSTANCE_ID")]
    pub instance_id: Option<String>,

    /// Per-operation deadline in seconds
    #[arg(long, env = "POSTGRES_STATEMENT_TIMEOUT")]
    pub statement_timeout: Option<u64>,
}

impl DbConfig {
    /// Connection URL for the configured database.
    pub fn connection_url(&self) -> DbResult<String> {
        self.connection_url_for(&self.database)
    }

    /// Connection URL for another database on the same server.
    pub fn connection_url_for(&self, database: &str) -> DbResult<String> {
        let invalid = |what: &str| DbError::invalid_input(format!("Invalid database {what}"));
        let mut url = Url::parse("postgres://localhost")
            .map_err(|e| DbError::internal(format!("base URL: {e}")))?;
        url.set_host(Some(&self.host)).map_err(|_| invalid("host"))?;
        url.set_port(Some(self.port)).map_err(|_| invalid("port"))?;
        url.set_username(&self.user).map_err(|_| invalid("user"))?;
        url.set_password(Some(&self.password))
            .map_err(|_| invalid("password"))?;
        url.set_path(&format!("/{database}"));
        Ok(url.to_string())
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: Some(self.max_conns),
            min_connections: Some(self.min_conns),
            max_lifetime_secs: Some(self.max_conn_lifetime),
            idle_timeout_secs: Some(self.max_conn_idle_time),
            ..PoolOptions::default()
        }
    }

    pub fn db_options(&self) -> DbOptions {
        let options = DbOptions::default();
        match self.statement_timeout {
            Some(secs) => options.with_statement_timeout(Duration::from_secs(secs)),
            None => options,
        }
    }
}

/// Operator actions of the `pg-access` binary.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Connect, report the server version and pool size
    Ping,
    /// Create the configured database if it does not exist
    CreateDb,
    /// Drop the configured database if it exists
    DropDb,
}

/// Configuration for the `pg-access` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pg-access",
    about = "PostgreSQL access layer maintenance tool",
    version,
    author
)]
pub struct Config {
    #[command(flatten)]
    pub db: DbConfig,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}
