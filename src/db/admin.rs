//! Creating and dropping databases.
//!
//! These run outside any pool, on a single connection to a maintenance
//! database of the same server (usually `postgres`), because a database
//! cannot be created or dropped from a connection to itself.

use crate::db::statement::validate_identifier;
use crate::error::{DbError, DbResult};
use futures_util::FutureExt;
use sqlx::{Connection, PgConnection};
use tracing::info;

/// Database names must be plain identifiers; they are double-quoted in the
/// statement, so case is preserved.
fn quoted_database_name(name: &str) -> DbResult<String> {
    if name.contains('.') {
        return Err(DbError::invalid_input(format!(
            "Invalid database name: {name:?}"
        )));
    }
    validate_identifier(name)?;
    Ok(format!("\"{name}\""))
}

async fn database_exists(conn: &mut PgConnection, name: &str) -> DbResult<bool> {
    let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .boxed()
        .await?;
    Ok(found.is_some())
}

/// Create database `name` unless it already exists. Returns whether it was
/// created.
pub async fn create_db_if_not_exists(server_url: &str, name: &str) -> DbResult<bool> {
    let quoted = quoted_database_name(name)?;
    let mut conn = PgConnection::connect(server_url).await?;
    let created = if database_exists(&mut conn, name).await? {
        info!(database = %name, "Database already exists");
        false
    } else {
        sqlx::Executor::execute(&mut conn, sqlx::raw_sql(&format!("CREATE DATABASE {quoted}")))
            .await?;
        info!(database = %name, "Created database");
        true
    };
    conn.close().await?;
    Ok(created)
}

/// Drop database `name` if it exists.
pub async fn drop_db(server_url: &str, name: &str) -> DbResult<()> {
    let quoted = quoted_database_name(name)?;
    let mut conn = PgConnection::connect(server_url).await?;
    sqlx::Executor::execute(&mut conn, sqlx::raw_sql(&format!("DROP DATABASE IF EXISTS {quoted}")))
        .await?;
    info!(database = %name, "Dropped database");
    conn.close().await?;
    Ok(())
}
