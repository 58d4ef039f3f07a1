//! Database access layer.
//!
//! This module provides:
//! - The [`Database`] handle owning the connection pool
//! - Query identifiers and query logging
//! - Bulk insert, upsert and update statement building
//! - Serializable transaction retry
//! - Incremental (paged) queries
//! - Database creation and removal

pub mod admin;
pub mod database;
pub mod id;
pub mod incremental;
pub mod logging;
mod macros;
pub(crate) mod params;
pub mod statement;
pub mod transaction;

pub use database::{Database, SUPPORTED_DRIVERS};
pub use id::QueryIdGenerator;
pub use logging::{QueryEndLogEntry, QueryLog, set_query_logging_disabled};
pub use transaction::RetryPolicy;
