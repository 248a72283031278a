//! Background execution of fetch cycles.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use super::pipeline::{CycleReport, FeedPipeline, HealthGate};
use super::retry::RetryPolicy;
use crate::{NoticeboardError, Result};

/// Hands a feed's fetch cycle to something that runs it.
///
/// Implementations must return immediately; the caller never waits for the
/// cycle.
///
/// A feed's `last_fetched_at` only moves when its cycle finishes. A cycle
/// still waiting for a worker slot or sleeping in retry backoff leaves the
/// feed due, so the next tick dispatches it again. Overlapping cycles are
/// safe, but if cycles run slower than the tick rate the queue of waiting
/// tasks grows.
pub trait Dispatch: Send + Sync {
    /// Start a fetch cycle for `feed_id`.
    fn dispatch(&self, feed_id: i64);
}

/// Runs fetch cycles as tokio tasks, at most `max_concurrent` at a time.
///
/// Every attempt runs in its own task, so a panicking cycle surfaces as a
/// [`NoticeboardError::Task`] and goes through the retry policy like any
/// other infrastructure error.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    pipeline: FeedPipeline,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    /// Create a pool.
    pub fn new(pipeline: FeedPipeline, retry: RetryPolicy, max_concurrent: usize) -> Self {
        Self {
            pipeline,
            retry,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run a feed's cycle with retries and wait for it.
    pub async fn process(&self, feed_id: i64) -> Option<CycleReport> {
        self.retry
            .run_cycle(feed_id, || self.attempt(feed_id))
            .await
    }

    /// Permits not currently held by a running cycle.
    pub fn idle_slots(&self) -> usize {
        self.permits.available_permits()
    }

    async fn attempt(&self, feed_id: i64) -> Result<CycleReport> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| NoticeboardError::Task(e.to_string()))?;

        let pipeline = self.pipeline.clone();
        tokio::spawn(async move { pipeline.run_cycle(feed_id, HealthGate::Enforce).await })
            .await
            .map_err(|e| NoticeboardError::Task(format!("fetch cycle for feed {feed_id}: {e}")))?
    }
}

impl Dispatch for WorkerPool {
    fn dispatch(&self, feed_id: i64) {
        debug!(feed_id, idle_slots = self.idle_slots(), "dispatching fetch cycle");
        let pool = self.clone();
        tokio::spawn(async move {
            pool.process(feed_id).await;
        });
    }
}
