//! Query logging.
//!
//! Every statement and every transaction attempt runs inside a [`QueryLog`]
//! scope. The scope logs a start line when created and a structured
//! completion entry when [`QueryLog::finish`] is called. A scope dropped
//! without completion (its future was cancelled) logs that fact at debug
//! level instead.

use crate::db::id::QueryIdGenerator;
use crate::error::{DbError, DbResult};
use crate::models::{IsolationLevel, QueryParam};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{Level, debug, error};

/// Maximum length of the displayed query text.
pub const MAX_QUERY_DISPLAY_LEN: usize = 300;

/// Maximum number of arguments rendered in a log line.
pub const MAX_LOGGED_ARGS: usize = 20;

/// Maximum length of a single rendered argument.
pub const MAX_ARG_DISPLAY_LEN: usize = 50;

const ELLIPSIS: &str = "...";

static QUERY_LOGGING_DISABLED: AtomicBool = AtomicBool::new(false);

/// Turn query logging off (or back on) for the whole process. Meant for tests.
pub fn set_query_logging_disabled(disabled: bool) {
    QUERY_LOGGING_DISABLED.store(disabled, Ordering::Relaxed);
}

pub fn query_logging_disabled() -> bool {
    QUERY_LOGGING_DISABLED.load(Ordering::Relaxed)
}

/// Collapse all whitespace runs (newlines included) into single spaces and
/// cap the result at [`MAX_QUERY_DISPLAY_LEN`] characters.
pub fn normalize_query(query: &str) -> String {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate(&collapsed, MAX_QUERY_DISPLAY_LEN)
}

/// Render up to [`MAX_LOGGED_ARGS`] arguments, each capped at
/// [`MAX_ARG_DISPLAY_LEN`] characters, followed by `...` if any were left out.
pub fn summarize_args(args: &[QueryParam]) -> String {
    let mut parts: Vec<String> = args
        .iter()
        .take(MAX_LOGGED_ARGS)
        .map(|a| truncate(&a.to_string(), MAX_ARG_DISPLAY_LEN))
        .collect();
    if args.len() > MAX_LOGGED_ARGS {
        parts.push(ELLIPSIS.to_string());
    }
    parts.join(", ")
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}{}", &s[..idx], ELLIPSIS),
        None => s.to_string(),
    }
}

/// Severity for a finished query.
///
/// Cancellation is caller-initiated and a serialization failure inside a
/// retryable transaction is expected; both stay at debug.
pub fn completion_level(err: &DbError, retryable: bool) -> Level {
    if err.is_canceled() || (retryable && err.is_serialization_failure()) {
        Level::DEBUG
    } else {
        Level::ERROR
    }
}

/// Structured completion record for one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryEndLogEntry {
    pub id: String,
    pub query: String,
    pub args: String,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Query { retryable: bool },
    Transaction(IsolationLevel),
}

#[derive(Debug)]
struct Scope {
    id: String,
    kind: ScopeKind,
    query: String,
    args: String,
    start: Instant,
}

/// A logging scope around one statement or transaction attempt.
#[derive(Debug)]
#[must_use = "a QueryLog must be completed with finish() or done()"]
pub struct QueryLog {
    scope: Option<Scope>,
}

impl QueryLog {
    /// Open a scope for a statement and log its start.
    pub fn start(
        ids: &QueryIdGenerator,
        query: &str,
        args: &[QueryParam],
        retryable: bool,
    ) -> Self {
        if query_logging_disabled() {
            return Self { scope: None };
        }
        let scope = Scope {
            id: ids.next_id(),
            kind: ScopeKind::Query { retryable },
            query: normalize_query(query),
            args: summarize_args(args),
            start: Instant::now(),
        };
        debug!(
            query_id = %scope.id,
            "{} {} args={}",
            scope.id,
            scope.query,
            scope.args
        );
        Self { scope: Some(scope) }
    }

    /// Open a scope for a transaction attempt and log its start.
    pub fn transaction(ids: &QueryIdGenerator, isolation: IsolationLevel) -> Self {
        if query_logging_disabled() {
            return Self { scope: None };
        }
        let scope = Scope {
            id: ids.next_id(),
            kind: ScopeKind::Transaction(isolation),
            query: String::new(),
            args: String::new(),
            start: Instant::now(),
        };
        debug!(
            query_id = %scope.id,
            isolation = %isolation,
            "{} transaction (isolation {}) started",
            scope.id,
            isolation
        );
        Self { scope: Some(scope) }
    }

    /// Identifier of this scope, `None` when logging is disabled.
    pub fn id(&self) -> Option<&str> {
        self.scope.as_ref().map(|s| s.id.as_str())
    }

    /// Close a scope that does not track an error (single-row reads whose
    /// decoding is left to the caller).
    pub fn done(mut self) {
        if let Some(scope) = self.scope.take() {
            debug!(query_id = %scope.id, "{} done", scope.id);
        }
    }

    /// Close the scope with the operation's outcome.
    ///
    /// Statement errors come back annotated with the query identifier;
    /// transaction errors are returned untouched.
    pub fn finish<T>(mut self, result: DbResult<T>) -> DbResult<T> {
        let Some(scope) = self.scope.take() else {
            return result;
        };
        let elapsed = scope.start.elapsed();
        match scope.kind {
            ScopeKind::Transaction(isolation) => {
                log_transaction_end(&scope.id, isolation, elapsed, result.as_ref().err());
                result
            }
            ScopeKind::Query { retryable } => {
                let mut entry = QueryEndLogEntry {
                    id: scope.id,
                    query: scope.query,
                    args: scope.args,
                    duration_seconds: elapsed.as_secs_f64(),
                    error: None,
                };
                match result {
                    Ok(value) => {
                        emit(Level::DEBUG, &entry);
                        Ok(value)
                    }
                    Err(err) => {
                        let level = completion_level(&err, retryable);
                        let err = err.in_query(entry.id.clone());
                        entry.error = Some(err.to_string());
                        emit(level, &entry);
                        Err(err)
                    }
                }
            }
        }
    }
}

impl Drop for QueryLog {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.take() {
            debug!(
                query_id = %scope.id,
                duration_seconds = scope.start.elapsed().as_secs_f64(),
                "{} abandoned before completion",
                scope.id
            );
        }
    }
}

fn emit(level: Level, entry: &QueryEndLogEntry) {
    let error = entry.error.as_deref().unwrap_or_default();
    if level == Level::ERROR {
        error!(
            query_id = %entry.id,
            query = %entry.query,
            args = %entry.args,
            duration_seconds = entry.duration_seconds,
            error = %error,
            "Query failed"
        );
    } else {
        debug!(
            query_id = %entry.id,
            query = %entry.query,
            args = %entry.args,
            duration_seconds = entry.duration_seconds,
            error = %error,
            "Query finished"
        );
    }
}

fn log_transaction_end(
    id: &str,
    isolation: IsolationLevel,
    elapsed: Duration,
    err: Option<&DbError>,
) {
    match err {
        None => debug!(
            query_id = %id,
            isolation = %isolation,
            duration_seconds = elapsed.as_secs_f64(),
            "{} transaction (isolation {}) finished in {:?}",
            id,
            isolation,
            elapsed
        ),
        Some(e) => debug!(
            query_id = %id,
            isolation = %isolation,
            duration_seconds = elapsed.as_secs_f64(),
            error = %e,
            "{} transaction (isolation {}) finished in {:?} with error {}",
            id,
            isolation,
            elapsed,
            e
        ),
    }
}
