//! One fetch cycle for one feed.
//!
//! Fetcher → Parser → Persistence → Health Tracker. Remote problems come back
//! as a [`CycleReport`] carrying a [`FetchFailure`]; only infrastructure
//! problems (database, missing feed) are `Err`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::failure::{FailureReason, FetchFailure, FetchResult};
use super::fetcher::Fetcher;
use super::health::HealthTracker;
use super::parser;
use super::repository::{FeedRepository, ItemRepository};
use super::types::{CandidateItem, CycleOutcome, Feed, HealthStatus};
use crate::config::RssConfig;
use crate::db::Database;
use crate::{NoticeboardError, Result};

/// Whether a cycle refuses Critical feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthGate {
    /// Critical feeds are skipped with `feed_critical`.
    Enforce,
    /// Critical feeds are fetched anyway.
    Bypass,
}

/// Item counts from a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistStats {
    /// Items found in the document.
    pub parsed: usize,
    /// Items that were new and got stored.
    pub created: usize,
}

/// What one cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Feed the cycle ran for.
    pub feed_id: i64,
    /// Feed display name.
    pub feed_name: String,
    /// Item counts, or the normalized failure.
    pub outcome: FetchResult<PersistStats>,
}

impl CycleReport {
    /// True if the cycle was refused before fetching and nothing was recorded.
    pub fn is_skipped(&self) -> bool {
        matches!(&self.outcome, Err(f) if f.reason.is_skip())
    }

    /// The failure, if the cycle did not succeed.
    pub fn failure(&self) -> Option<&FetchFailure> {
        self.outcome.as_ref().err()
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(stats) => write!(
                f,
                "feed {} ({}): {} new of {} items",
                self.feed_id, self.feed_name, stats.created, stats.parsed
            ),
            Err(failure) => write!(f, "feed {} ({}): {}", self.feed_id, self.feed_name, failure),
        }
    }
}

/// Runs fetch cycles against the database.
#[derive(Debug, Clone)]
pub struct FeedPipeline {
    db: Database,
    fetcher: Arc<Fetcher>,
    health: HealthTracker,
    critical_threshold: i64,
}

impl FeedPipeline {
    /// Create a pipeline.
    pub fn new(db: Database, fetcher: Arc<Fetcher>, config: &RssConfig) -> Self {
        Self {
            health: HealthTracker::new(db.clone(), config.critical_error_threshold),
            db,
            fetcher,
            critical_threshold: config.critical_error_threshold,
        }
    }

    /// Database handle.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Run one cycle for `feed_id`.
    pub async fn run_cycle(&self, feed_id: i64, gate: HealthGate) -> Result<CycleReport> {
        let feed = FeedRepository::new(self.db.pool())
            .get_by_id(feed_id)
            .await?
            .ok_or_else(|| NoticeboardError::NotFound(format!("feed {feed_id}")))?;

        if let Some(skip) = self.skip_reason(&feed, gate) {
            debug!(feed_id, reason = %skip.reason, "skipping feed");
            return Ok(report(&feed, Err(skip)));
        }

        let fetched_at = Utc::now();
        match self.fetch_and_parse(&feed, fetched_at).await {
            Ok(candidates) => {
                let parsed = candidates.len();
                let created = persist_items(&self.db, feed.id, &candidates, fetched_at).await?;
                self.health
                    .record(feed.id, &CycleOutcome::Success, fetched_at)
                    .await?;
                Ok(report(&feed, Ok(PersistStats { parsed, created })))
            }
            Err(failure) => {
                self.health
                    .record(feed.id, &CycleOutcome::Failure(failure.clone()), fetched_at)
                    .await?;
                Ok(report(&feed, Err(failure)))
            }
        }
    }

    fn skip_reason(&self, feed: &Feed, gate: HealthGate) -> Option<FetchFailure> {
        if !feed.active {
            return Some(FetchFailure::new(
                FailureReason::FeedInactive,
                format!("feed {} is inactive", feed.id),
            ));
        }
        if gate == HealthGate::Enforce
            && feed.health_status(self.critical_threshold) == HealthStatus::Critical
        {
            return Some(FetchFailure::new(
                FailureReason::FeedCritical,
                format!(
                    "feed {} is critical ({} consecutive errors)",
                    feed.id, feed.health.error_count
                ),
            ));
        }
        None
    }

    async fn fetch_and_parse(
        &self,
        feed: &Feed,
        fetched_at: DateTime<Utc>,
    ) -> FetchResult<Vec<CandidateItem>> {
        let bytes = self.fetcher.fetch(&feed.url).await?;
        parser::parse(&bytes, fetched_at)
    }
}

fn report(feed: &Feed, outcome: FetchResult<PersistStats>) -> CycleReport {
    CycleReport {
        feed_id: feed.id,
        feed_name: feed.name.clone(),
        outcome,
    }
}

/// Store the candidates whose guid the feed does not have yet.
///
/// A failing insert is logged and skipped; the rest of the batch still goes
/// in. Returns the number of items stored.
pub async fn persist_items(
    db: &Database,
    feed_id: i64,
    candidates: &[CandidateItem],
    now: DateTime<Utc>,
) -> Result<usize> {
    let repo = ItemRepository::new(db.pool());
    let mut seen = repo.existing_guids(feed_id).await?;
    let mut created = 0;

    for candidate in candidates {
        if seen.contains(&candidate.guid) {
            continue;
        }
        match repo.insert(feed_id, candidate, now).await {
            Ok(_) => {
                seen.insert(candidate.guid.clone());
                created += 1;
            }
            Err(e) => {
                warn!(feed_id, guid = %candidate.guid, error = %e, "failed to store feed item");
            }
        }
    }

    Ok(created)
}
