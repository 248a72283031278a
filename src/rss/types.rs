//! RSS ingestion types.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::rss::failure::FetchFailure;

/// Maximum stored length of `last_error`, in characters.
pub const MAX_LAST_ERROR_LENGTH: usize = 1000;

/// Default consecutive-failure count at which a feed becomes Critical.
pub const DEFAULT_CRITICAL_THRESHOLD: i64 = 3;

/// Title used for items that carry none.
pub const UNTITLED: &str = "Untitled";

/// An operator-registered feed source.
#[derive(Debug, Clone)]
pub struct Feed {
    /// Feed ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Feed URL (operator-supplied, untrusted).
    pub url: String,
    /// Whether the feed is polled at all.
    pub active: bool,
    /// Health fields, mutated only by fetch cycles.
    pub health: FeedHealth,
    /// When the feed was created.
    pub created_at: DateTime<Utc>,
    /// When the feed was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Feed {
    /// Derived health classification.
    pub fn health_status(&self, critical_threshold: i64) -> HealthStatus {
        HealthStatus::classify(self.health.error_count, critical_threshold)
    }

    /// Whether enough time has passed since the last attempt.
    pub fn needs_refresh(&self, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
        match self.health.last_fetched_at {
            None => true,
            Some(last) => now.signed_duration_since(last) >= interval,
        }
    }

    /// Whether the scheduler should dispatch this feed.
    pub fn is_eligible(
        &self,
        now: DateTime<Utc>,
        interval: chrono::Duration,
        critical_threshold: i64,
    ) -> bool {
        self.active
            && self.health_status(critical_threshold) != HealthStatus::Critical
            && self.needs_refresh(now, interval)
    }
}

/// New feed for creation.
#[derive(Debug, Clone)]
pub struct NewFeed {
    /// Display name.
    pub name: String,
    /// Feed URL.
    pub url: String,
    /// Whether the feed starts active.
    pub active: bool,
}

impl NewFeed {
    /// Create a new active feed. The URL is trimmed.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into().trim().to_string(),
            active: true,
        }
    }

    /// Create the feed inactive.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// The four health fields of a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedHealth {
    /// Consecutive failures since the last success.
    pub error_count: i64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Last attempt, successful or not.
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Last successful attempt.
    pub last_successful_fetch_at: Option<DateTime<Utc>>,
}

impl FeedHealth {
    /// Apply the outcome of one fetch cycle.
    ///
    /// Success resets the counter; failure increments it by exactly one and
    /// keeps `last_successful_fetch_at` untouched.
    pub fn apply(self, outcome: &CycleOutcome, now: DateTime<Utc>) -> FeedHealth {
        match outcome {
            CycleOutcome::Success => FeedHealth {
                error_count: 0,
                last_error: None,
                last_fetched_at: Some(now),
                last_successful_fetch_at: Some(now),
            },
            CycleOutcome::Failure(failure) => FeedHealth {
                error_count: self.error_count + 1,
                last_error: Some(truncate_chars(&failure.message, MAX_LAST_ERROR_LENGTH)),
                last_fetched_at: Some(now),
                last_successful_fetch_at: self.last_successful_fetch_at,
            },
        }
    }
}

/// Outcome of a fetch cycle as seen by the health tracker.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Fetched, parsed and persisted.
    Success,
    /// A normalized fetch or parse failure.
    Failure(FetchFailure),
}

/// Derived health classification of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// No failures since the last success.
    Healthy,
    /// Some failures, below the critical threshold.
    Warning,
    /// At or above the critical threshold; skipped by the scheduler.
    Critical,
}

impl HealthStatus {
    /// Classify a consecutive-failure count.
    pub fn classify(error_count: i64, critical_threshold: i64) -> Self {
        if error_count <= 0 {
            HealthStatus::Healthy
        } else if error_count < critical_threshold {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }

    /// Lowercase name for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A stored feed item.
#[derive(Debug, Clone)]
pub struct Item {
    /// Item ID.
    pub id: i64,
    /// Owning feed.
    pub feed_id: i64,
    /// Item title.
    pub title: String,
    /// Item description, as published.
    pub description: Option<String>,
    /// Link to the original article.
    pub link: Option<String>,
    /// Stable identifier within the feed.
    pub guid: String,
    /// Publication time (fetch time if the source gave none).
    pub published_at: DateTime<Utc>,
    /// When the item was stored.
    pub created_at: DateTime<Utc>,
}

/// An item extracted from a fetched document, not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    /// Item title.
    pub title: String,
    /// Item description.
    pub description: Option<String>,
    /// Link to the original article.
    pub link: Option<String>,
    /// Source guid, or the link when the source has none.
    pub guid: String,
    /// Publication time, or the fetch time when absent.
    pub published_at: DateTime<Utc>,
}

/// Truncate to at most `max` characters without splitting a character.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rss::failure::FailureReason;
    use chrono::Duration;

    fn feed_with(error_count: i64, last_fetched_at: Option<DateTime<Utc>>) -> Feed {
        Feed {
            id: 1,
            name: "Campus News".to_string(),
            url: "https://example.com/feed.rss".to_string(),
            active: true,
            health: FeedHealth {
                error_count,
                last_fetched_at,
                ..FeedHealth::default()
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_feed_trims_url() {
        let feed = NewFeed::new("News", "  https://example.com/feed.rss \n");
        assert_eq!(feed.url, "https://example.com/feed.rss");
        assert!(feed.active);
        assert!(!feed.inactive().active);
    }

    #[test]
    fn test_health_classification() {
        assert_eq!(HealthStatus::classify(0, 3), HealthStatus::Healthy);
        assert_eq!(HealthStatus::classify(1, 3), HealthStatus::Warning);
        assert_eq!(HealthStatus::classify(2, 3), HealthStatus::Warning);
        assert_eq!(HealthStatus::classify(3, 3), HealthStatus::Critical);
        assert_eq!(HealthStatus::classify(17, 3), HealthStatus::Critical);
        assert_eq!(HealthStatus::Critical.to_string(), "critical");
    }

    #[test]
    fn test_apply_success_resets() {
        let now = Utc::now();
        let before = FeedHealth {
            error_count: 4,
            last_error: Some("timeout".to_string()),
            last_fetched_at: Some(now - Duration::hours(2)),
            last_successful_fetch_at: None,
        };

        let after = before.apply(&CycleOutcome::Success, now);
        assert_eq!(after.error_count, 0);
        assert!(after.last_error.is_none());
        assert_eq!(after.last_fetched_at, Some(now));
        assert_eq!(after.last_successful_fetch_at, Some(now));
    }

    #[test]
    fn test_apply_failure_increments_by_one() {
        let now = Utc::now();
        let earlier = now - Duration::days(1);
        let before = FeedHealth {
            error_count: 1,
            last_error: None,
            last_fetched_at: Some(earlier),
            last_successful_fetch_at: Some(earlier),
        };
        let failure = FetchFailure::new(FailureReason::Timeout, "request timed out");

        let after = before.apply(&CycleOutcome::Failure(failure), now);
        assert_eq!(after.error_count, 2);
        assert_eq!(after.last_error.as_deref(), Some("request timed out"));
        assert_eq!(after.last_fetched_at, Some(now));
        assert_eq!(after.last_successful_fetch_at, Some(earlier));
    }

    #[test]
    fn test_apply_failure_truncates_message() {
        let failure = FetchFailure::new(FailureReason::HttpError, "é".repeat(1500));
        let after = FeedHealth::default().apply(&CycleOutcome::Failure(failure), Utc::now());
        assert_eq!(
            after.last_error.unwrap().chars().count(),
            MAX_LAST_ERROR_LENGTH
        );
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
        assert_eq!(truncate_chars("ありがとう", 2), "あり");
    }

    #[test]
    fn test_needs_refresh() {
        let now = Utc::now();
        let hour = Duration::hours(1);
        assert!(feed_with(0, None).needs_refresh(now, hour));
        assert!(!feed_with(0, Some(now - Duration::minutes(59))).needs_refresh(now, hour));
        assert!(feed_with(0, Some(now - hour)).needs_refresh(now, hour));
        assert!(feed_with(0, Some(now - Duration::hours(2))).needs_refresh(now, hour));
    }

    #[test]
    fn test_eligibility() {
        let now = Utc::now();
        let hour = Duration::hours(1);
        assert!(feed_with(2, None).is_eligible(now, hour, 3));
        assert!(!feed_with(3, None).is_eligible(now, hour, 3));

        let mut inactive = feed_with(0, None);
        inactive.active = false;
        assert!(!inactive.is_eligible(now, hour, 3));
    }
}
