//! Error types for the access layer.
//!
//! This module defines all error types using `thiserror`. The conversion from
//! `sqlx::Error` is the single place where driver error codes are inspected;
//! everything above it matches on variants.

use thiserror::Error;

/// SQLSTATE reported by Postgres when a serializable transaction loses a conflict.
pub const SERIALIZATION_FAILURE_CODE: &str = "40001";

/// SQLSTATE for "canceling statement due to user request".
pub const QUERY_CANCELED_CODE: &str = "57014";

/// SQLSTATE for a connection to a database that does not exist.
pub const INVALID_CATALOG_NAME_CODE: &str = "3D000";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "23505" for a unique violation
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Serialization failure: {message}")]
    SerializationFailure { message: String },

    #[error("Operation canceled")]
    Canceled,

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Database '{database}' not found: {hint}")]
    DatabaseNotFound { database: String, hint: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Reached max number of retries due to serialization failure ({retries}): {source}")]
    MaxRetriesExceeded {
        retries: u32,
        #[source]
        source: Box<DbError>,
    },

    #[error("running query {id}: {source}")]
    Query {
        id: String,
        #[source]
        source: Box<DbError>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn serialization_failure(message: impl Into<String>) -> Self {
        Self::SerializationFailure {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a database not found error.
    pub fn database_not_found(database: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::DatabaseNotFound {
            database: database.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Annotate an error with the identifier of the query that produced it.
    pub fn in_query(self, id: impl Into<String>) -> Self {
        Self::Query {
            id: id.into(),
            source: Box::new(self),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self.root() {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::DatabaseNotFound { hint, .. } => Some(hint),
            _ => None,
        }
    }

    /// The innermost error, looking through query and retry annotations.
    pub fn root(&self) -> &DbError {
        match self {
            Self::Query { source, .. } | Self::MaxRetriesExceeded { source, .. } => source.root(),
            other => other,
        }
    }

    /// The SQLSTATE reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self.root() {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            Self::SerializationFailure { .. } => Some(SERIALIZATION_FAILURE_CODE),
            _ => None,
        }
    }

    /// True when a serializable transaction should be retried from scratch.
    ///
    /// A `MaxRetriesExceeded` error is terminal and never reports true.
    pub fn is_serialization_failure(&self) -> bool {
        match self {
            Self::SerializationFailure { .. } => true,
            Self::Query { source, .. } => source.is_serialization_failure(),
            _ => false,
        }
    }

    /// True for caller-initiated cancellation, including the server-side
    /// "canceling statement due to user request".
    pub fn is_canceled(&self) -> bool {
        matches!(self.root(), Self::Canceled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            Self::NotFound { .. } | Self::DatabaseNotFound { .. }
        )
    }

    /// Programming errors fail immediately and are never retried.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self.root(), Self::InvalidInput { .. })
    }
}

/// Extract the first double-quoted name from a server message such as
/// `database "foo" does not exist`.
fn quoted_name(message: &str) -> Option<&str> {
    let start = message.find('"')? + 1;
    let len = message[start..].find('"')?;
    Some(&message[start..start + len])
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    Some(SERIALIZATION_FAILURE_CODE) => {
                        DbError::serialization_failure(db_err.message())
                    }
                    Some(QUERY_CANCELED_CODE) => DbError::Canceled,
                    Some(INVALID_CATALOG_NAME_CODE) => DbError::database_not_found(
                        quoted_name(db_err.message()).unwrap_or_default(),
                        "Create the database first or check the database name",
                    ),
                    _ => DbError::database(
                        db_err.message(),
                        code,
                        "Check the SQL syntax and referenced objects",
                    ),
                }
            }
            sqlx::Error::RowNotFound => DbError::not_found("no rows returned"),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring a pooled connection",
                "Increase max_connections or reduce concurrent load",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reopen the database handle")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::invalid_input(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::invalid_input(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
