//! Transaction isolation levels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Isolation level requested for a transaction.
///
/// `Default` leaves the server's `default_transaction_isolation` in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The statement that selects this level, if any. Must run before any
    /// other statement in the transaction.
    pub fn set_statement(&self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::ReadUncommitted => Some("SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED"),
            Self::ReadCommitted => Some("SET TRANSACTION ISOLATION LEVEL READ COMMITTED"),
            Self::RepeatableRead => Some("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ"),
            Self::Serializable => Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"),
        }
    }

    /// Serialization failures under this level are retried blindly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Serializable)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "Default",
            Self::ReadUncommitted => "Read Uncommitted",
            Self::ReadCommitted => "Read Committed",
            Self::RepeatableRead => "Repeatable Read",
            Self::Serializable => "Serializable",
        })
    }
}
