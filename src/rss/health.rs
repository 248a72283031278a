//! Per-feed health recording.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::repository::FeedRepository;
use super::types::{CycleOutcome, FeedHealth, HealthStatus};
use crate::db::Database;
use crate::{NoticeboardError, Result};

/// Writes fetch-cycle outcomes to a feed's health fields.
///
/// The tracker reads the current fields, applies [`FeedHealth::apply`] and
/// writes all four back only if nobody else wrote in between; otherwise it
/// reads again. Every recorded failure therefore adds exactly one to
/// `error_count`, even with overlapping cycles for the same feed.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    db: Database,
    critical_threshold: i64,
}

impl HealthTracker {
    /// Create a tracker.
    pub fn new(db: Database, critical_threshold: i64) -> Self {
        Self {
            db,
            critical_threshold,
        }
    }

    /// Record one outcome and return the resulting health.
    pub async fn record(
        &self,
        feed_id: i64,
        outcome: &CycleOutcome,
        now: DateTime<Utc>,
    ) -> Result<FeedHealth> {
        let repo = FeedRepository::new(self.db.pool());
        let (before, updated) = loop {
            let current = repo
                .get_health(feed_id)
                .await?
                .ok_or_else(|| NoticeboardError::NotFound(format!("feed {feed_id}")))?;
            let before = HealthStatus::classify(current.error_count, self.critical_threshold);
            let updated = current.clone().apply(outcome, now);
            if repo.update_health(feed_id, &current, &updated, now).await? {
                break (before, updated);
            }
            debug!(feed_id, "health changed by a concurrent cycle, reapplying");
        };

        let after = HealthStatus::classify(updated.error_count, self.critical_threshold);
        if before != after {
            match after {
                HealthStatus::Critical => warn!(
                    feed_id,
                    error_count = updated.error_count,
                    "feed is now critical and will be skipped by the scheduler"
                ),
                _ => info!(feed_id, from = %before, to = %after, "feed health changed"),
            }
        }

        Ok(updated)
    }
}
