//! Retry around a whole fetch cycle.
//!
//! Only infrastructure errors are retried. A remote feed that times out or
//! returns garbage has already been recorded by the cycle and waits for the
//! next tick.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

use super::pipeline::CycleReport;
use crate::config::RssConfig;
use crate::{NoticeboardError, Result};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay before the first retry; doubled for each one after.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
        }
    }

    /// Build the policy from the `[rss]` config section.
    pub fn from_config(config: &RssConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_base_delay())
    }

    /// Delay before retry `n` (1-based): `base_delay * 2^(n-1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    /// Run `op`, retrying retryable errors.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && retry < self.retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!(
                        task = label,
                        error = %e,
                        retry,
                        delay_secs = delay.as_secs_f64(),
                        "task failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one fetch cycle through `op` and log how it went.
    ///
    /// Returns the report, or `None` when the cycle could not be completed.
    pub async fn run_cycle<F, Fut>(&self, feed_id: i64, op: F) -> Option<CycleReport>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CycleReport>>,
    {
        let label = format!("feed {feed_id}");
        match self.run(&label, op).await {
            Ok(report) => {
                log_report(&report);
                Some(report)
            }
            Err(e) => {
                error!(feed_id, error = %e, "fetch cycle failed, giving up");
                None
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RssConfig::default())
    }
}

/// Errors a later attempt may not hit again.
fn is_retryable(e: &NoticeboardError) -> bool {
    matches!(
        e,
        NoticeboardError::Database(_)
            | NoticeboardError::DatabaseConnection(_)
            | NoticeboardError::Io(_)
            | NoticeboardError::Task(_)
    )
}

fn log_report(report: &CycleReport) {
    match &report.outcome {
        Ok(stats) => info!(
            feed_id = report.feed_id,
            feed = %report.feed_name,
            parsed = stats.parsed,
            created = stats.created,
            "fetched feed"
        ),
        Err(failure) if failure.reason.is_skip() => info!(
            feed_id = report.feed_id,
            feed = %report.feed_name,
            reason = %failure.reason,
            "skipped feed"
        ),
        Err(failure) => warn!(
            feed_id = report.feed_id,
            feed = %report.feed_name,
            reason = %failure.reason,
            message = %failure.message,
            "failed to fetch feed"
        ),
    }
}
