//! Serializable retry for transactions.
//!
//! A transaction attempt is `begin -> work -> commit`. When the attempt runs
//! at an isolation level whose conflicts are retryable and fails with a
//! serialization failure, the whole attempt is repeated from scratch after
//! an exponentially growing pause. Everything else is returned as is.

use crate::config::DbOptions;
use crate::error::{DbError, DbResult};
use crate::models::IsolationLevel;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bounds on how often and how fast a transaction is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Pause before retry number `retry` (1-based): the initial backoff,
    /// doubled for every earlier retry.
    pub fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << shift)
    }
}

impl From<&DbOptions> for RetryPolicy {
    fn from(options: &DbOptions) -> Self {
        Self {
            max_retries: options.max_retries,
            initial_backoff: options.initial_retry_backoff,
        }
    }
}

/// Decides, after each failed attempt, whether the transaction runs again.
///
/// `observed` records the highest retry number reached by any transaction
/// sharing it. Backoff sleeps end early with [`DbError::Canceled`] when
/// `cancel` fires.
pub(crate) struct Retrier<'a> {
    policy: RetryPolicy,
    isolation: IsolationLevel,
    observed: &'a AtomicU32,
    cancel: Option<&'a CancellationToken>,
    retry: u32,
}

impl<'a> Retrier<'a> {
    pub(crate) fn new(
        policy: RetryPolicy,
        isolation: IsolationLevel,
        observed: &'a AtomicU32,
        cancel: Option<&'a CancellationToken>,
    ) -> Self {
        Self {
            policy,
            isolation,
            observed,
            cancel,
            retry: 0,
        }
    }

    /// Handle a failed attempt. `Ok(())` means run the attempt again after
    /// the backoff that has already elapsed; `Err` is the final error.
    pub(crate) async fn on_failure(&mut self, err: DbError) -> DbResult<()> {
        if !(self.isolation.is_retryable() && err.is_serialization_failure()) {
            return Err(err);
        }

        if self.retry >= self.policy.max_retries {
            warn!(
                retries = self.policy.max_retries,
                isolation = %self.isolation,
                error = %err,
                "Giving up on transaction after repeated serialization failures"
            );
            return Err(DbError::MaxRetriesExceeded {
                retries: self.policy.max_retries,
                source: Box::new(err),
            });
        }

        self.retry += 1;
        self.observed.fetch_max(self.retry, Ordering::Relaxed);
        let delay = self.policy.backoff(self.retry);
        debug!(
            retry = self.retry,
            delay_ms = delay.as_millis() as u64,
            "Serialization failure, retrying transaction"
        );
        match self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(DbError::Canceled),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    /// Retries performed so far.
    pub(crate) fn retries(&self) -> u32 {
        self.retry
    }
}
