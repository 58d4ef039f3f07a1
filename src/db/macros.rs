//! Statement execution macro shared by the handle's operations.

/// Run `$body` with `$conn: &mut PgConnection` leased from `$db`.
///
/// The body races the handle's cancellation token and statement timeout.
/// A statement cut short by either is cancelled on the server before the
/// connection is released. Evaluates to a future of `DbResult<T>`.
///
/// sqlx futures awaited in `$body` should be `.boxed()` so the surrounding
/// future stays `Send` for every borrow it holds.
///
/// # Example
///
/// ```ignore
/// let affected = on_connection!(self, "exec", |conn| {
///     let done = sqlx::query(sql).execute(&mut *conn).boxed().await?;
///     Ok(done.rows_affected())
/// })
/// .await;
/// ```
macro_rules! on_connection {
    ($db:expr, $operation:expr, |$conn:ident| $body:block) => {
        async {
            let db: &$crate::db::Database = &$db;
            let operation: &str = $operation;
            let mut lease = db.lease(operation).await?;
            let pid = lease.pid();
            let outcome = db
                .bounded(operation, pid, async {
                    let $conn = lease.conn()?;
                    $body
                })
                .await;
            lease.release(&outcome).await;
            outcome
        }
    };
}

pub(crate) use on_connection;
