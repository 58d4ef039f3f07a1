//! PostgreSQL access layer.
//!
//! A typed client over a `sqlx` connection pool providing serializable
//! transaction retry, bulk insert/upsert/update statements, size-bounded
//! query logging with per-query identifiers, and incremental queries.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, DbConfig, DbOptions, PoolOptions};
pub use db::Database;
pub use error::{DbError, DbResult};
pub use models::{IsolationLevel, OnConflict, QueryParam, UpdateColumn};
