//! Bounded, timed store calls with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use yalls_store::StoreError;
use yalls_utils::StatsCounter;

use crate::config::EarningsConfig;
use crate::service::counters;
use crate::EarningsError;

/// Exponential backoff: starts at the initial delay, doubles, saturates at the cap.
#[derive(Clone, Debug)]
pub struct Backoff {
    next_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            next_ms: initial_ms.min(max_ms),
            max_ms,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_millis(self.next_ms);
        self.next_ms = self.next_ms.saturating_mul(2).min(self.max_ms);
        delay
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub timeout: Duration,
}

impl From<&EarningsConfig> for RetryPolicy {
    fn from(config: &EarningsConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            timeout: Duration::from_millis(config.write_timeout_ms),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> Backoff {
        Backoff::new(
            self.initial_backoff.as_millis() as u64,
            self.max_backoff.as_millis() as u64,
        )
    }

    /// Run `call` on the blocking pool, retrying transient failures and timeouts.
    ///
    /// `call` must be idempotent: a timed-out attempt keeps running in the
    /// background and may still commit after a later attempt has. Once any
    /// attempt has timed out, exhaustion is reported as
    /// [`EarningsError::PersistenceTimeout`], since the outcome is unknown.
    pub(crate) async fn run<T, F>(
        &self,
        stats: &StatsCounter,
        op: &'static str,
        call: F,
    ) -> Result<T, EarningsError>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, StoreError> + Send + Sync + 'static,
    {
        let call = Arc::new(call);
        let mut backoff = self.backoff();
        let mut attempt: u32 = 0;
        let mut timed_out = false;

        loop {
            attempt += 1;
            let task = {
                let call = Arc::clone(&call);
                tokio::task::spawn_blocking(move || call())
            };

            let failure = match tokio::time::timeout(self.timeout, task).await {
                Ok(Ok(Ok(value))) => return Ok(value),
                Ok(Ok(Err(err))) if err.is_transient() => err.to_string(),
                Ok(Ok(Err(err))) => return Err(err.into()),
                Ok(Err(join_err)) => return Err(EarningsError::Task(join_err.to_string())),
                Err(_elapsed) => {
                    timed_out = true;
                    if attempt > self.max_retries {
                        tracing::error!(op, attempts = attempt, "store call timed out");
                        return Err(EarningsError::PersistenceTimeout { attempts: attempt });
                    }
                    "timed out".to_string()
                }
            };

            if attempt > self.max_retries {
                tracing::error!(op, attempts = attempt, error = %failure, "store call failed");
                if timed_out {
                    return Err(EarningsError::PersistenceTimeout { attempts: attempt });
                }
                return Err(StoreError::Unavailable(failure).into());
            }

            let delay = backoff.next_delay();
            stats.increment(counters::STORE_RETRIES);
            tracing::warn!(
                op,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "retrying store call"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
