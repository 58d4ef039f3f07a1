//! Data models shared by the access layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod bulk;
pub mod query;
pub mod transaction;

pub use bulk::{OnConflict, UpdateColumn};
pub use query::QueryParam;
pub use transaction::IsolationLevel;
