//! The database handle.
//!
//! [`Database`] owns the connection pool and is the only public entry point
//! for running statements. A handle is either bound to the pool or, inside
//! [`Database::transact`], to one open transaction. Every operation is
//! wrapped in a [`QueryLog`] scope and raced against the handle's
//! cancellation token and statement timeout; a statement cut short is also
//! cancelled on the server.
//!
//! Every future returned here is `Send`, so operations can run inside
//! `tokio::spawn`. sqlx's own futures are boxed where they are awaited to
//! keep that true.

use crate::config::{DbOptions, PoolOptions};
use crate::db::id::QueryIdGenerator;
use crate::db::logging::QueryLog;
use crate::db::macros::on_connection;
use crate::db::params::{array_kind, bind_all, bind_array};
use crate::db::statement;
use crate::db::transaction::{Retrier, RetryPolicy};
use crate::error::{DbError, DbResult};
use crate::models::{IsolationLevel, OnConflict, QueryParam, UpdateColumn};
use futures_util::{FutureExt, TryStreamExt};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Connection, PgConnection, PgPool, Postgres, Row, Transaction};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Driver names accepted by [`Database::open`]. All select sqlx's Postgres
/// driver.
pub const SUPPORTED_DRIVERS: &[&str] = &["postgres", "postgresql", "pgx"];

const TRANSACTION_CLOSED: &str = "Transaction is no longer active";

/// Upper bound on delivering a server-side cancel request.
const CANCEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared by a handle and every clone or transaction handle made
/// from it.
struct Shared {
    pool: PgPool,
    instance_id: String,
    options: DbOptions,
    ids: QueryIdGenerator,
    max_retries: AtomicU32,
}

/// One open transaction. The slot is emptied when the transaction ends,
/// which makes every handle still pointing at it fail.
struct TxSlot {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
    isolation: IsolationLevel,
    /// Server process of the transaction's connection; 0 until looked up.
    pid: AtomicI32,
}

#[derive(Clone)]
enum Conn {
    Pool,
    Tx(Arc<TxSlot>),
}

/// A connection checked out for one statement. `pid` is the server process
/// behind it, known when the statement may have to be cancelled.
pub(crate) struct Lease<'a> {
    conn: Leased<'a>,
    pid: Option<i32>,
}

enum Leased<'a> {
    Pooled(PoolConnection<Postgres>),
    Tx(MutexGuard<'a, Option<Transaction<'static, Postgres>>>),
}

impl Lease<'_> {
    pub(crate) fn conn(&mut self) -> DbResult<&mut PgConnection> {
        match &mut self.conn {
            Leased::Pooled(conn) => Ok(&mut **conn),
            Leased::Tx(guard) => guard
                .as_mut()
                .map(|tx| &mut **tx)
                .ok_or_else(|| DbError::transaction(TRANSACTION_CLOSED)),
        }
    }

    pub(crate) fn pid(&self) -> Option<i32> {
        self.pid
    }

    /// Give the connection back. A pooled connection whose statement was
    /// interrupted is closed instead, since its reply may still be in flight.
    pub(crate) async fn release<T>(self, outcome: &DbResult<T>) {
        let interrupted = matches!(outcome, Err(DbError::Canceled | DbError::Timeout { .. }));
        if let (true, Leased::Pooled(conn)) = (interrupted, self.conn) {
            if let Err(err) = conn.detach().close().await {
                debug!(error = %err, "Closing interrupted connection failed");
            }
        }
    }
}

async fn backend_pid(conn: &mut PgConnection) -> DbResult<i32> {
    let pid = sqlx::query_scalar::<_, i32>("SELECT pg_backend_pid()")
        .fetch_one(&mut *conn)
        .boxed()
        .await?;
    Ok(pid)
}

/// A transaction this handle opened, waiting to be committed or rolled back.
struct TxScope {
    slot: Arc<TxSlot>,
    log: QueryLog,
}

/// Handle to a PostgreSQL database.
///
/// Cloning is cheap; clones share the pool, the query counter and the retry
/// counter.
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
    conn: Conn,
    cancel: Option<CancellationToken>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("instance_id", &self.shared.instance_id)
            .field("in_transaction", &self.in_transaction())
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl Database {
    /// Open a pool with default pool sizing and options.
    ///
    /// Fails with [`DbError::DatabaseNotFound`] when the server is reachable
    /// but the database named in `url` does not exist.
    pub async fn open(driver: &str, url: &str, instance_id: &str) -> DbResult<Self> {
        Self::connect(
            driver,
            url,
            instance_id,
            &PoolOptions::default(),
            DbOptions::default(),
        )
        .await
    }

    /// Open a pool. Pool settings given in `pool_options` win over those
    /// found in the URL query string.
    pub async fn connect(
        driver: &str,
        url: &str,
        instance_id: &str,
        pool_options: &PoolOptions,
        options: DbOptions,
    ) -> DbResult<Self> {
        if !SUPPORTED_DRIVERS.contains(&driver) {
            return Err(DbError::invalid_input(format!(
                "Unsupported driver {driver:?}, expected one of {}",
                SUPPORTED_DRIVERS.join(", ")
            )));
        }
        options.validate()?;
        let (url, pool_opts) = pool_options.merge_from_url(url)?;

        let pool = PgPoolOptions::new()
            .min_connections(pool_opts.min_connections_or_default())
            .max_connections(pool_opts.max_connections_or_default())
            .max_lifetime(pool_opts.max_lifetime_or_default())
            .idle_timeout(pool_opts.idle_timeout_or_default())
            .acquire_timeout(pool_opts.acquire_timeout_or_default())
            .test_before_acquire(pool_opts.test_before_acquire_or_default())
            .connect(&url)
            .await
            .map_err(|e| match DbError::from(e) {
                err @ DbError::DatabaseNotFound { .. } => err,
                err => DbError::connection(
                    format!("Failed to connect: {err}"),
                    "Check that the server is running and the credentials are correct",
                ),
            })?;

        info!(
            driver = %driver,
            instance_id = %instance_id,
            max_connections = pool_opts.max_connections_or_default(),
            "Connected to PostgreSQL"
        );
        Ok(Self::from_pool(pool, instance_id, options))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, instance_id: &str, options: DbOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                pool,
                instance_id: instance_id.to_string(),
                options,
                ids: QueryIdGenerator::new(instance_id),
                max_retries: AtomicU32::new(0),
            }),
            conn: Conn::Pool,
            cancel: None,
        }
    }

    /// A clone of this handle whose operations end with
    /// [`DbError::Canceled`] once `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            conn: self.conn.clone(),
            cancel: Some(token),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.shared.pool
    }

    pub fn options(&self) -> &DbOptions {
        &self.shared.options
    }

    pub fn instance_id(&self) -> &str {
        &self.shared.instance_id
    }

    /// Whether this handle is bound to a transaction.
    pub fn in_transaction(&self) -> bool {
        matches!(self.conn, Conn::Tx(_))
    }

    /// Highest retry number any transaction on this handle has reached.
    pub fn max_retries(&self) -> u32 {
        self.shared.max_retries.load(Ordering::Relaxed)
    }

    /// Close the pool, waiting for checked-out connections to come back.
    pub async fn close(&self) -> DbResult<()> {
        if self.in_transaction() {
            return Err(DbError::invalid_input(
                "close called on a transaction handle",
            ));
        }
        info!(instance_id = %self.shared.instance_id, "Closing database pool");
        self.shared.pool.close().await;
        Ok(())
    }

    pub(crate) fn ids(&self) -> &QueryIdGenerator {
        &self.shared.ids
    }

    /// Statements inside a serializable transaction may fail with a
    /// serialization error that the transaction will retry.
    pub(crate) fn retryable(&self) -> bool {
        matches!(&self.conn, Conn::Tx(slot) if slot.isolation.is_retryable())
    }

    /// Whether statements on this handle can be cut short.
    fn interruptible(&self) -> bool {
        self.cancel.is_some() || self.shared.options.statement_timeout.is_some()
    }

    /// Race `fut` against the cancellation token and the statement timeout.
    pub(crate) async fn guard<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = DbResult<T>>,
    ) -> DbResult<T> {
        let bounded = async {
            match self.shared.options.statement_timeout {
                Some(limit) => tokio::time::timeout(limit, fut)
                    .await
                    .map_err(|_| DbError::timeout(operation, limit.as_millis() as u64))?,
                None => fut.await,
            }
        };
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(DbError::Canceled),
                result = bounded => result,
            },
            None => bounded.await,
        }
    }

    /// Like [`guard`](Self::guard) for a statement running on the server
    /// process `pid`. When the statement is cut short, the server is asked to
    /// cancel it too, while the caller still holds the connection.
    pub(crate) async fn bounded<T>(
        &self,
        operation: &str,
        pid: Option<i32>,
        fut: impl Future<Output = DbResult<T>>,
    ) -> DbResult<T> {
        let outcome = self.guard(operation, fut).await;
        if let (Err(DbError::Canceled | DbError::Timeout { .. }), Some(pid)) = (&outcome, pid) {
            self.cancel_backend(pid).await;
        }
        outcome
    }

    /// Ask the server to cancel whatever backend `pid` is running. The
    /// request goes over a fresh connection so it never waits on the pool.
    async fn cancel_backend(&self, pid: i32) {
        let options = self.shared.pool.connect_options();
        let request = async {
            let mut conn = PgConnection::connect_with(&options).await?;
            let cancelled: bool = sqlx::query_scalar("SELECT pg_cancel_backend($1)")
                .bind(pid)
                .fetch_one(&mut conn)
                .boxed()
                .await?;
            conn.close().await?;
            Ok::<_, sqlx::Error>(cancelled)
        };
        match tokio::time::timeout(CANCEL_REQUEST_TIMEOUT, request).await {
            Ok(Ok(cancelled)) => debug!(pid, cancelled, "Sent server-side cancel"),
            Ok(Err(err)) => warn!(pid, error = %err, "Server-side cancel failed"),
            Err(_) => warn!(pid, "Server-side cancel timed out"),
        }
    }

    /// Check out the connection this handle runs statements on.
    pub(crate) async fn lease(&self, operation: &str) -> DbResult<Lease<'_>> {
        let interruptible = self.interruptible();
        self.guard(operation, async {
            match &self.conn {
                Conn::Pool => {
                    let mut conn = self.shared.pool.acquire().await?;
                    let pid = if interruptible {
                        Some(backend_pid(&mut conn).await?)
                    } else {
                        None
                    };
                    Ok(Lease {
                        conn: Leased::Pooled(conn),
                        pid,
                    })
                }
                Conn::Tx(slot) => {
                    let mut guard = slot.tx.lock().await;
                    let pid = match (interruptible, guard.as_mut()) {
                        (true, Some(tx)) => match slot.pid.load(Ordering::Relaxed) {
                            0 => {
                                let pid = backend_pid(tx).await?;
                                slot.pid.store(pid, Ordering::Relaxed);
                                Some(pid)
                            }
                            pid => Some(pid),
                        },
                        _ => None,
                    };
                    Ok(Lease {
                        conn: Leased::Tx(guard),
                        pid,
                    })
                }
            }
        })
        .await
    }

    /// Execute a statement and return the number of rows it affected.
    ///
    /// Without arguments the text is sent as a simple query, so it may hold
    /// several `;`-separated statements.
    pub async fn exec(&self, sql: &str, args: &[QueryParam]) -> DbResult<u64> {
        let log = QueryLog::start(self.ids(), sql, args, self.retryable());
        let outcome = on_connection!(self, "exec", |conn| {
            let result = if args.is_empty() {
                sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql)).await?
            } else {
                bind_all(sqlx::query(sql), args)
                    .execute(&mut *conn)
                    .boxed()
                    .await?
            };
            Ok(result.rows_affected())
        })
        .await;
        log.finish(outcome)
    }

    /// Fetch at most one row.
    pub async fn query_optional(&self, sql: &str, args: &[QueryParam]) -> DbResult<Option<PgRow>> {
        let log = QueryLog::start(self.ids(), sql, args, self.retryable());
        let outcome = on_connection!(self, "query row", |conn| {
            Ok(bind_all(sqlx::query(sql), args)
                .fetch_optional(&mut *conn)
                .boxed()
                .await?)
        })
        .await;
        match outcome {
            // Decoding happens in the caller.
            Ok(row) => {
                log.done();
                Ok(row)
            }
            Err(err) => log.finish(Err(err)),
        }
    }

    /// Fetch exactly one row; no row is [`DbError::NotFound`].
    pub async fn query_row(&self, sql: &str, args: &[QueryParam]) -> DbResult<PgRow> {
        self.query_optional(sql, args)
            .await?
            .ok_or_else(|| DbError::not_found("query returned no rows"))
    }

    /// Stream every row through `on_row` and return how many there were.
    /// An error from `on_row` stops the query and is returned.
    pub async fn run_query<F>(&self, sql: &str, args: &[QueryParam], mut on_row: F) -> DbResult<u64>
    where
        F: FnMut(&PgRow) -> DbResult<()>,
    {
        let log = QueryLog::start(self.ids(), sql, args, self.retryable());
        let outcome = on_connection!(self, "query", |conn| {
            let mut rows = bind_all(sqlx::query(sql), args).fetch(&mut *conn);
            let mut count = 0;
            while let Some(row) = rows.try_next().await? {
                on_row(&row)?;
                count += 1;
            }
            Ok(count)
        })
        .await;
        log.finish(outcome)
    }

    /// First column of every row, decoded as `T`.
    pub async fn collect1<T>(&self, sql: &str, args: &[QueryParam]) -> DbResult<Vec<T>>
    where
        T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        let mut out = Vec::new();
        self.run_query(sql, args, |row| {
            out.push(row.try_get::<T, _>(0)?);
            Ok(())
        })
        .await?;
        Ok(out)
    }

    /// Every row decoded into `T`.
    pub async fn collect_rows<T>(&self, sql: &str, args: &[QueryParam]) -> DbResult<Vec<T>>
    where
        T: for<'r> sqlx::FromRow<'r, PgRow>,
    {
        let mut out = Vec::new();
        self.run_query(sql, args, |row| {
            out.push(T::from_row(row)?);
            Ok(())
        })
        .await?;
        Ok(out)
    }

    /// Run `work` in a transaction at `isolation`.
    ///
    /// `work` receives a handle bound to the transaction and may be called
    /// more than once: under `Serializable`, a serialization failure rolls
    /// the attempt back and runs begin, `work` and commit again, up to
    /// `max_retries` times. The handle passed to `work` stops working once
    /// its attempt ends.
    pub async fn transact<T, F, Fut>(&self, isolation: IsolationLevel, mut work: F) -> DbResult<T>
    where
        F: FnMut(Database) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        if self.in_transaction() {
            return Err(DbError::invalid_input(
                "transact called on a transaction handle; nested transactions are not supported",
            ));
        }
        let mut retrier = Retrier::new(
            RetryPolicy::from(&self.shared.options),
            isolation,
            &self.shared.max_retries,
            self.cancel.as_ref(),
        );
        loop {
            let (handle, scope) = self.begin_scope(isolation).await?;
            let outcome = work(handle).await;
            match self.end_scope(scope, outcome).await {
                Ok(value) => {
                    if retrier.retries() > 0 {
                        debug!(retries = retrier.retries(), "Transaction succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) => retrier.on_failure(err).await?,
            }
        }
    }

    /// Begin a transaction and return a handle bound to it.
    async fn begin_scope(&self, isolation: IsolationLevel) -> DbResult<(Database, TxScope)> {
        let log = QueryLog::transaction(self.ids(), isolation);
        let begun = self
            .guard("begin transaction", async {
                Ok(self.shared.pool.begin().boxed().await?)
            })
            .await;
        let tx = match begun {
            Ok(tx) => tx,
            Err(err) => return log.finish(Err(err)),
        };

        let slot = Arc::new(TxSlot {
            tx: Mutex::new(Some(tx)),
            isolation,
            pid: AtomicI32::new(0),
        });
        let handle = Database {
            shared: Arc::clone(&self.shared),
            conn: Conn::Tx(Arc::clone(&slot)),
            cancel: self.cancel.clone(),
        };
        let scope = TxScope { slot, log };
        if let Some(set_isolation) = isolation.set_statement() {
            if let Err(err) = handle.exec(set_isolation, &[]).await {
                return self.end_scope(scope, Err(err)).await;
            }
        }
        Ok((handle, scope))
    }

    /// Commit on success, roll back on failure, and invalidate the
    /// transaction's handles either way.
    async fn end_scope<T>(&self, scope: TxScope, outcome: DbResult<T>) -> DbResult<T> {
        let TxScope { slot, log } = scope;
        let tx = slot.tx.lock().await.take();
        let result = match (tx, outcome) {
            (Some(tx), Ok(value)) => self
                .guard("commit", async { Ok(tx.commit().boxed().await?) })
                .await
                .map(|()| value),
            (Some(tx), Err(err)) => {
                let rolled_back = self
                    .guard("rollback", async { Ok(tx.rollback().boxed().await?) })
                    .await;
                if let Err(rollback_err) = rolled_back {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
            (None, Ok(_)) => Err(DbError::transaction(TRANSACTION_CLOSED)),
            (None, Err(err)) => Err(err),
        };
        log.finish(result)
    }

    /// Bulk operations on a pool handle run in their own transaction so that
    /// their statements apply together or not at all.
    async fn implicit_scope(&self) -> DbResult<(Database, Option<TxScope>)> {
        if self.in_transaction() {
            return Ok((self.clone(), None));
        }
        let (handle, scope) = self
            .begin_scope(self.shared.options.default_isolation)
            .await?;
        Ok((handle, Some(scope)))
    }

    async fn end_implicit<T>(&self, scope: Option<TxScope>, outcome: DbResult<T>) -> DbResult<T> {
        match scope {
            Some(scope) => self.end_scope(scope, outcome).await,
            None => outcome,
        }
    }

    /// Insert `values`, laid out row by row, into `columns` of `table`.
    /// Returns the number of rows inserted.
    pub async fn bulk_insert(
        &self,
        table: &str,
        columns: &[&str],
        values: &[QueryParam],
        on_conflict: &OnConflict,
    ) -> DbResult<u64> {
        self.insert(table, columns, values, on_conflict, &[], |_| Ok(()))
            .await
    }

    /// Like [`bulk_insert`](Self::bulk_insert), calling `on_row` for each
    /// row produced by `RETURNING returning`.
    pub async fn bulk_insert_returning<F>(
        &self,
        table: &str,
        columns: &[&str],
        values: &[QueryParam],
        on_conflict: &OnConflict,
        returning: &[&str],
        on_row: F,
    ) -> DbResult<u64>
    where
        F: FnMut(&PgRow) -> DbResult<()>,
    {
        if returning.is_empty() {
            return Err(DbError::invalid_input(
                "bulk_insert_returning needs at least one returning column",
            ));
        }
        self.insert(table, columns, values, on_conflict, returning, on_row)
            .await
    }

    /// Insert rows, replacing the non-key columns of rows that collide on
    /// `conflict_columns`.
    pub async fn bulk_upsert(
        &self,
        table: &str,
        columns: &[&str],
        values: &[QueryParam],
        conflict_columns: &[&str],
    ) -> DbResult<u64> {
        let on_conflict = OnConflict::update(conflict_columns.iter().copied());
        self.insert(table, columns, values, &on_conflict, &[], |_| Ok(()))
            .await
    }

    /// [`bulk_upsert`](Self::bulk_upsert) with a `RETURNING` clause.
    pub async fn bulk_upsert_returning<F>(
        &self,
        table: &str,
        columns: &[&str],
        values: &[QueryParam],
        conflict_columns: &[&str],
        returning: &[&str],
        on_row: F,
    ) -> DbResult<u64>
    where
        F: FnMut(&PgRow) -> DbResult<()>,
    {
        let on_conflict = OnConflict::update(conflict_columns.iter().copied());
        self.bulk_insert_returning(table, columns, values, &on_conflict, returning, on_row)
            .await
    }

    async fn insert<F>(
        &self,
        table: &str,
        columns: &[&str],
        values: &[QueryParam],
        on_conflict: &OnConflict,
        returning: &[&str],
        on_row: F,
    ) -> DbResult<u64>
    where
        F: FnMut(&PgRow) -> DbResult<()>,
    {
        let rows = statement::row_count(columns, values.len())?;
        statement::validate_identifier(table)?;
        statement::conflict_clause(columns, on_conflict)?;
        if rows == 0 {
            return Ok(0);
        }

        let (handle, scope) = self.implicit_scope().await?;
        let outcome = handle
            .insert_chunks(table, columns, values, on_conflict, returning, on_row)
            .await;
        self.end_implicit(scope, outcome).await
    }

    /// One statement per chunk of rows small enough for the bind limit.
    async fn insert_chunks<F>(
        &self,
        table: &str,
        columns: &[&str],
        values: &[QueryParam],
        on_conflict: &OnConflict,
        returning: &[&str],
        mut on_row: F,
    ) -> DbResult<u64>
    where
        F: FnMut(&PgRow) -> DbResult<()>,
    {
        let per_statement =
            statement::rows_per_statement(columns.len(), self.shared.options.max_bind_params);
        let mut total = 0;
        for chunk in values.chunks(per_statement * columns.len()) {
            let sql = statement::build_insert_query(
                table,
                columns,
                chunk.len() / columns.len(),
                on_conflict,
                returning,
            )?;
            total += if returning.is_empty() {
                self.exec(&sql, chunk).await?
            } else {
                self.run_query(&sql, chunk, &mut on_row).await?
            };
        }
        Ok(total)
    }

    /// Update rows of `table` from columnar values. The first column is the
    /// key matched against existing rows; the rest are assigned. Large
    /// updates are split into batches of at most `max_bulk_update_array_len`
    /// rows.
    pub async fn bulk_update(&self, table: &str, columns: &[UpdateColumn]) -> DbResult<u64> {
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let types: Vec<&str> = columns.iter().map(|c| c.sql_type.as_str()).collect();
        let lens: Vec<usize> = columns.iter().map(|c| c.values.len()).collect();
        let rows = statement::validate_bulk_update(table, &names, &types, &lens)?;
        for column in columns {
            array_kind(&column.name, &column.values)?;
        }
        if rows == 0 {
            return Ok(0);
        }

        let sql = statement::build_bulk_update_query(table, &names, &types);
        let (handle, scope) = self.implicit_scope().await?;
        let outcome = handle.update_batches(&sql, columns, rows).await;
        self.end_implicit(scope, outcome).await
    }

    async fn update_batches(&self, sql: &str, columns: &[UpdateColumn], rows: usize) -> DbResult<u64> {
        let mut total = 0;
        for range in statement::batches(rows, self.shared.options.max_bulk_update_array_len) {
            let slices: Vec<&[QueryParam]> = columns
                .iter()
                .map(|c| &c.values[range.clone()])
                .collect();
            // Log the keys of the batch.
            let log = QueryLog::start(self.ids(), sql, slices[0], self.retryable());
            let outcome = on_connection!(self, "bulk update", |conn| {
                let mut query = sqlx::query(sql);
                for (column, values) in columns.iter().zip(slices.iter().copied()) {
                    query = bind_array(query, &column.name, values)?;
                }
                Ok(query.execute(&mut *conn).boxed().await?.rows_affected())
            })
            .await;
            total += log.finish(outcome)?;
        }
        Ok(total)
    }

    /// The server's `server_version` setting.
    pub async fn server_version(&self) -> DbResult<String> {
        let row = self.query_row("SHOW server_version", &[]).await?;
        Ok(row.try_get::<String, _>(0)?)
    }
}
