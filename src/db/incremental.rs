//! Incremental queries.
//!
//! The caller's SQL ends in a `LIMIT` placeholder. Each page re-runs the
//! whole statement with a larger limit and skips the rows earlier pages
//! already delivered, so it only works for queries with a stable `ORDER BY`.
//! Paging ends when the callback breaks, when `max_rows` rows have been
//! delivered, or when a page comes back short.

use crate::db::database::Database;
use crate::db::logging::QueryLog;
use crate::db::macros::on_connection;
use crate::db::params::bind_all;
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use futures_util::TryStreamExt;
use sqlx::postgres::PgRow;
use std::ops::ControlFlow;

/// Paging state for one incremental query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pager {
    page_size: usize,
    max_rows: usize,
    delivered: usize,
    limit: usize,
    done: bool,
}

impl Pager {
    pub(crate) fn new(page_size: usize, max_rows: usize) -> DbResult<Self> {
        if page_size == 0 {
            return Err(DbError::invalid_input("page size must be greater than 0"));
        }
        Ok(Self {
            page_size,
            max_rows,
            delivered: 0,
            limit: 0,
            done: false,
        })
    }

    /// Limit for the next page, or `None` once paging is over.
    pub(crate) fn next_limit(&mut self) -> Option<usize> {
        if self.done || self.is_full() {
            return None;
        }
        self.limit = self
            .delivered
            .saturating_add(self.page_size)
            .min(self.max_rows);
        Some(self.limit)
    }

    /// Whether the row at `position` (0-based within the current page) was
    /// handed to the callback by an earlier page.
    pub(crate) fn already_delivered(&self, position: usize) -> bool {
        position < self.delivered
    }

    pub(crate) fn record_delivery(&mut self) {
        self.delivered += 1;
    }

    pub(crate) fn is_full(&self) -> bool {
        self.delivered >= self.max_rows
    }

    /// Close the current page after `rows_seen` rows. A short page means
    /// the result set is exhausted.
    pub(crate) fn end_page(&mut self, rows_seen: usize) {
        if rows_seen < self.limit {
            self.done = true;
        }
    }

    pub(crate) fn stop(&mut self) {
        self.done = true;
    }

    pub(crate) fn delivered(&self) -> usize {
        self.delivered
    }
}

impl Database {
    /// Run `sql` page by page, calling `on_row` once for each row.
    ///
    /// The page limit is bound after `args`, so with no other arguments the
    /// statement looks like `SELECT ... ORDER BY i LIMIT $1`. Returning
    /// `ControlFlow::Break` from `on_row` ends the query early without an
    /// error; any error it returns is the result of the whole call. Returns
    /// the number of rows delivered.
    pub async fn run_query_incrementally<F>(
        &self,
        sql: &str,
        args: &[QueryParam],
        page_size: usize,
        max_rows: usize,
        mut on_row: F,
    ) -> DbResult<usize>
    where
        F: FnMut(&PgRow) -> DbResult<ControlFlow<()>>,
    {
        let mut pager = Pager::new(page_size, max_rows)?;
        while let Some(limit) = pager.next_limit() {
            let mut page_args = args.to_vec();
            page_args.push(QueryParam::Int(limit as i64));

            let log = QueryLog::start(self.ids(), sql, &page_args, self.retryable());
            let outcome = on_connection!(self, "incremental query page", |conn| {
                let mut rows = bind_all(sqlx::query(sql), &page_args).fetch(&mut *conn);
                let mut seen = 0;
                while let Some(row) = rows.try_next().await? {
                    let position = seen;
                    seen += 1;
                    if pager.already_delivered(position) {
                        continue;
                    }
                    let flow = on_row(&row)?;
                    pager.record_delivery();
                    if flow.is_break() {
                        pager.stop();
                        return Ok(());
                    }
                    if pager.is_full() {
                        return Ok(());
                    }
                }
                pager.end_page(seen);
                Ok(())
            })
            .await;
            log.finish(outcome)?;
        }
        Ok(pager.delivered())
    }
}
