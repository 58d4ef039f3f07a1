//! SQL text for bulk statements.
//!
//! Only identifiers (table, column and type names) are ever spliced into the
//! statement text, and only after validation. Values always travel as
//! positional parameters.

use crate::error::{DbError, DbResult};
use crate::models::OnConflict;
use std::fmt::Write as _;
use std::ops::Range;

/// Check that `name` is a plain identifier, optionally schema-qualified
/// (`schema.table`).
pub fn validate_identifier(name: &str) -> DbResult<()> {
    let mut parts = 0;
    for part in name.split('.') {
        parts += 1;
        let mut chars = part.chars();
        let valid = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if !valid || parts > 2 {
            return Err(DbError::invalid_input(format!(
                "Invalid SQL identifier: {name:?}"
            )));
        }
    }
    Ok(())
}

/// Check a SQL type name such as `INT`, `NUMERIC(10, 2)` or
/// `TIMESTAMP WITH TIME ZONE`.
pub fn validate_sql_type(sql_type: &str) -> DbResult<()> {
    let valid = sql_type
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && sql_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '(' | ')' | ',' | '.'));
    if valid {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "Invalid SQL type: {sql_type:?}"
        )))
    }
}

fn validate_identifiers<S: AsRef<str>>(names: &[S]) -> DbResult<()> {
    names.iter().try_for_each(|n| validate_identifier(n.as_ref()))
}

/// Validate a flat bulk value list against its columns and return the number
/// of rows it holds.
pub fn row_count<S: AsRef<str>>(columns: &[S], num_values: usize) -> DbResult<usize> {
    if columns.is_empty() {
        return Err(DbError::invalid_input("bulk insert requires at least one column"));
    }
    let remainder = num_values % columns.len();
    if remainder != 0 {
        return Err(DbError::invalid_input(format!(
            "modulus of len(values) and len(columns) must be 0: got {} values for {} columns (remainder {})",
            num_values,
            columns.len(),
            remainder
        )));
    }
    Ok(num_values / columns.len())
}

/// Rows that fit in one statement without exceeding `max_params` placeholders.
pub fn rows_per_statement(num_columns: usize, max_params: usize) -> usize {
    (max_params / num_columns.max(1)).max(1)
}

/// `ON CONFLICT (keys) DO UPDATE SET a=excluded.a, ...` covering every
/// column that is not a conflict key, in column order.
pub fn build_upsert_conflict_action<S: AsRef<str>, K: AsRef<str>>(
    columns: &[S],
    conflict_columns: &[K],
) -> String {
    let keys = join(conflict_columns);
    let sets: Vec<String> = columns
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| !conflict_columns.iter().any(|k| k.as_ref() == *c))
        .map(|c| format!("{c}=excluded.{c}"))
        .collect();
    if sets.is_empty() {
        // Every inserted column is part of the key: nothing to update.
        return format!("ON CONFLICT ({keys}) DO NOTHING");
    }
    format!("ON CONFLICT ({keys}) DO UPDATE SET {}", sets.join(", "))
}

/// The conflict clause for a bulk insert, empty when conflicts are errors.
pub fn conflict_clause<S: AsRef<str>>(columns: &[S], on_conflict: &OnConflict) -> DbResult<String> {
    match on_conflict {
        OnConflict::Error => Ok(String::new()),
        OnConflict::DoNothing => Ok("ON CONFLICT DO NOTHING".to_string()),
        OnConflict::DoUpdate { conflict_columns } => {
            if conflict_columns.is_empty() {
                return Err(DbError::invalid_input(
                    "upsert requires at least one conflict column",
                ));
            }
            validate_identifiers(conflict_columns)?;
            Ok(build_upsert_conflict_action(columns, conflict_columns))
        }
    }
}

/// Build `INSERT INTO table (cols) VALUES ($1, ...), ... [conflict] [RETURNING ...]`
/// for `num_rows` rows.
pub fn build_insert_query<S: AsRef<str>, R: AsRef<str>>(
    table: &str,
    columns: &[S],
    num_rows: usize,
    on_conflict: &OnConflict,
    returning: &[R],
) -> DbResult<String> {
    validate_identifier(table)?;
    validate_identifiers(columns)?;
    validate_identifiers(returning)?;
    if columns.is_empty() || num_rows == 0 {
        return Err(DbError::invalid_input(
            "insert statement needs at least one column and one row",
        ));
    }

    let mut sql = format!("INSERT INTO {} ({}) VALUES ", table, join(columns));
    let mut placeholder = 1;
    for row in 0..num_rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..columns.len() {
            if col > 0 {
                sql.push_str(", ");
            }
            // Writing to a String cannot fail.
            let _ = write!(sql, "${placeholder}");
            placeholder += 1;
        }
        sql.push(')');
    }

    let conflict = conflict_clause(columns, on_conflict)?;
    if !conflict.is_empty() {
        sql.push(' ');
        sql.push_str(&conflict);
    }
    if !returning.is_empty() {
        sql.push_str(" RETURNING ");
        sql.push_str(&join(returning));
    }
    Ok(sql)
}

/// Build the array-unnesting update statement. The first column is the key;
/// parameter `$i` carries the array for `columns[i-1]`.
///
/// ```text
/// UPDATE t SET c1 = data.c1 FROM (SELECT UNNEST($1::T0[]) AS k, UNNEST($2::T1[]) AS c1) AS data
/// WHERE t.k = data.k
/// ```
pub fn build_bulk_update_query<S: AsRef<str>, T: AsRef<str>>(
    table: &str,
    columns: &[S],
    types: &[T],
) -> String {
    let key = columns[0].as_ref();
    let sets: Vec<String> = columns[1..]
        .iter()
        .map(|c| format!("{0} = data.{0}", c.as_ref()))
        .collect();
    let unnests: Vec<String> = columns
        .iter()
        .zip(types)
        .enumerate()
        .map(|(i, (c, t))| format!("UNNEST(${}::{}[]) AS {}", i + 1, t.as_ref(), c.as_ref()))
        .collect();
    format!(
        "UPDATE {table}\n\
         SET {}\n\
         FROM (SELECT {}) AS data\n\
         WHERE {table}.{key} = data.{key}",
        sets.join(", "),
        unnests.join(", "),
    )
}

/// Validate bulk update arguments and return the number of rows to update.
pub fn validate_bulk_update<S: AsRef<str>, T: AsRef<str>>(
    table: &str,
    columns: &[S],
    types: &[T],
    column_lens: &[usize],
) -> DbResult<usize> {
    validate_identifier(table)?;
    validate_identifiers(columns)?;
    types.iter().try_for_each(|t| validate_sql_type(t.as_ref()))?;
    if columns.len() < 2 {
        return Err(DbError::invalid_input(
            "bulk update needs a key column and at least one value column",
        ));
    }
    if columns.len() != types.len() || columns.len() != column_lens.len() {
        return Err(DbError::invalid_input(format!(
            "bulk update got {} columns, {} types and {} value slices",
            columns.len(),
            types.len(),
            column_lens.len()
        )));
    }
    let rows = column_lens[0];
    if let Some((i, len)) = column_lens.iter().enumerate().find(|(_, len)| **len != rows) {
        return Err(DbError::invalid_input(format!(
            "bulk update column {} has {} values, want {}",
            columns[i].as_ref(),
            len,
            rows
        )));
    }
    Ok(rows)
}

/// Split `0..len` into consecutive ranges of at most `max` elements.
pub fn batches(len: usize, max: usize) -> impl Iterator<Item = Range<usize>> {
    let max = max.max(1);
    (0..len)
        .step_by(max)
        .map(move |start| start..(start + max).min(len))
}

fn join<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| n.as_ref())
        .collect::<Vec<&str>>()
        .join(", ")
}
