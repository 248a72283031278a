//! Operator-facing feed operations.
//!
//! Feed management plus the manual refresh and preview triggers. Manual
//! cycles run synchronously and, unless configured otherwise, also run for
//! Critical feeds so an operator can force-retry a broken source.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::config::RssConfig;
use crate::db::Database;
use crate::rss::failure::FetchFailure;
use crate::rss::fetcher::{FetchSettings, Fetcher};
use crate::rss::pipeline::{CycleReport, FeedPipeline, HealthGate};
use crate::rss::repository::{FeedRepository, ItemRepository};
use crate::rss::ssrf::parse_feed_url;
use crate::rss::types::{Feed, HealthStatus, Item, NewFeed};
use crate::{NoticeboardError, Result};

/// Result of a manual preview.
#[derive(Debug, Clone)]
pub struct Preview {
    /// The cycle that ran before the items were read.
    pub report: CycleReport,
    /// Most recent stored items of the feed.
    pub items: Vec<Item>,
}

impl Preview {
    /// Failure of the cycle, if any.
    pub fn failure(&self) -> Option<&FetchFailure> {
        self.report.failure()
    }
}

/// Service for feed operations.
#[derive(Debug, Clone)]
pub struct FeedService {
    pipeline: FeedPipeline,
    config: RssConfig,
}

impl FeedService {
    /// Create a service with a fetcher built from `config`.
    pub fn new(db: Database, config: &RssConfig) -> Self {
        let fetcher = Arc::new(Fetcher::new(FetchSettings::from_config(config)));
        Self::with_pipeline(FeedPipeline::new(db, fetcher, config), config)
    }

    /// Create a service around an existing pipeline.
    pub fn with_pipeline(pipeline: FeedPipeline, config: &RssConfig) -> Self {
        Self {
            pipeline,
            config: config.clone(),
        }
    }

    fn db(&self) -> &Database {
        self.pipeline.db()
    }

    /// Register a feed.
    ///
    /// # Errors
    ///
    /// Returns a validation error if:
    /// - The name is blank
    /// - The URL is not an absolute http(s) URL
    /// - The URL is already registered
    pub async fn add_feed(&self, name: &str, url: &str) -> Result<Feed> {
        let new_feed = validated_feed(name, url, true)?;
        let feed = FeedRepository::new(self.db().pool())
            .create(&new_feed, Utc::now())
            .await?;
        info!(feed_id = feed.id, name = %feed.name, url = %feed.url, "feed added");
        Ok(feed)
    }

    /// Get a feed by ID.
    pub async fn get_feed(&self, feed_id: i64) -> Result<Feed> {
        FeedRepository::new(self.db().pool())
            .get_by_id(feed_id)
            .await?
            .ok_or_else(|| NoticeboardError::NotFound(format!("feed {feed_id}")))
    }

    /// Health classification of a feed under the configured threshold.
    pub fn health_of(&self, feed: &Feed) -> HealthStatus {
        feed.health_status(self.config.critical_error_threshold)
    }

    /// List all feeds, ordered by name.
    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        FeedRepository::new(self.db().pool()).list_all().await
    }

    /// List Critical feeds, worst first.
    pub async fn list_unhealthy(&self) -> Result<Vec<Feed>> {
        FeedRepository::new(self.db().pool())
            .list_unhealthy(self.config.critical_error_threshold)
            .await
    }

    /// Most recent items of active feeds. `None` uses the dashboard default.
    pub async fn recent_items(&self, limit: Option<usize>) -> Result<Vec<Item>> {
        let limit = limit.unwrap_or(self.config.dashboard_item_limit);
        ItemRepository::new(self.db().pool())
            .recent(sql_limit(limit))
            .await
    }

    /// Activate or deactivate a feed.
    pub async fn set_active(&self, feed_id: i64, active: bool) -> Result<Feed> {
        let repo = FeedRepository::new(self.db().pool());
        if !repo.set_active(feed_id, active, Utc::now()).await? {
            return Err(NoticeboardError::NotFound(format!("feed {feed_id}")));
        }
        info!(feed_id, active, "feed activation changed");
        self.get_feed(feed_id).await
    }

    /// Edit a feed's name, URL and active flag.
    ///
    /// Same checks as [`FeedService::add_feed`]. Health history is kept.
    pub async fn update_feed(
        &self,
        feed_id: i64,
        name: &str,
        url: &str,
        active: bool,
    ) -> Result<Feed> {
        let edit = validated_feed(name, url, active)?;
        if !FeedRepository::new(self.db().pool())
            .update(feed_id, &edit, Utc::now())
            .await?
        {
            return Err(NoticeboardError::NotFound(format!("feed {feed_id}")));
        }
        info!(feed_id, name = %edit.name, url = %edit.url, active, "feed updated");
        self.get_feed(feed_id).await
    }

    /// Delete a feed and its items.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<()> {
        if !FeedRepository::new(self.db().pool()).delete(feed_id).await? {
            return Err(NoticeboardError::NotFound(format!("feed {feed_id}")));
        }
        info!(feed_id, "feed deleted");
        Ok(())
    }

    /// Fetch a feed now and wait for the result.
    ///
    /// The failure reason and message, if any, are returned in the report.
    pub async fn refresh(&self, feed_id: i64) -> Result<CycleReport> {
        let report = self.pipeline.run_cycle(feed_id, self.manual_gate()).await?;
        info!(feed_id, "manual refresh: {}", report);
        Ok(report)
    }

    /// Fetch a feed now, then return its most recent items.
    pub async fn preview(&self, feed_id: i64) -> Result<Preview> {
        let report = self.refresh(feed_id).await?;
        let items = ItemRepository::new(self.db().pool())
            .list_by_feed(feed_id, sql_limit(self.config.preview_item_limit))
            .await?;
        Ok(Preview { report, items })
    }

    fn manual_gate(&self) -> HealthGate {
        if self.config.manual_refresh_respects_health_gate {
            HealthGate::Enforce
        } else {
            HealthGate::Bypass
        }
    }
}

fn validated_feed(name: &str, url: &str, active: bool) -> Result<NewFeed> {
    let mut feed = NewFeed::new(name.trim(), url);
    if feed.name.is_empty() {
        return Err(NoticeboardError::Validation(
            "feed name must not be blank".to_string(),
        ));
    }
    parse_feed_url(&feed.url).map_err(|failure| NoticeboardError::Validation(failure.message))?;
    feed.active = active;
    Ok(feed)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
