//! Bulk statement request types.

use crate::models::QueryParam;
use serde::{Deserialize, Serialize};

/// What a bulk insert does when a row collides with an existing unique key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnConflict {
    /// No clause: the statement fails with the server's constraint violation.
    #[default]
    Error,
    /// `ON CONFLICT DO NOTHING`
    DoNothing,
    /// `ON CONFLICT (keys) DO UPDATE SET col=excluded.col, ...` for every
    /// inserted column that is not a key.
    DoUpdate { conflict_columns: Vec<String> },
}

impl OnConflict {
    /// Upsert on the given key columns.
    pub fn update<I, S>(conflict_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::DoUpdate {
            conflict_columns: conflict_columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// One column of a bulk update: name, SQL type used for the array cast,
/// and one value per updated row.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateColumn {
    pub name: String,
    pub sql_type: String,
    pub values: Vec<QueryParam>,
}

impl UpdateColumn {
    pub fn new(
        name: impl Into<String>,
        sql_type: impl Into<String>,
        values: Vec<QueryParam>,
    ) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_error() {
        assert_eq!(OnConflict::default(), OnConflict::Error);
    }

    #[test]
    fn test_update_helper() {
        assert_eq!(
            OnConflict::update(["c1"]),
            OnConflict::DoUpdate {
                conflict_columns: vec!["c1".to_string()]
            }
        );
    }
}
