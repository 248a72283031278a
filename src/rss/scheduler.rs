//! Periodic selection and dispatch of due feeds.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::repository::FeedRepository;
use super::worker::Dispatch;
use crate::config::RssConfig;
use crate::db::Database;
use crate::Result;

/// Picks feeds that are due and hands each one to a [`Dispatch`].
pub struct Orchestrator {
    db: Database,
    dispatcher: Arc<dyn Dispatch>,
    tick_interval: Duration,
    refresh_interval: chrono::Duration,
    critical_threshold: i64,
}

impl Orchestrator {
    /// Create an orchestrator from the `[rss]` config section.
    pub fn new(db: Database, dispatcher: Arc<dyn Dispatch>, config: &RssConfig) -> Self {
        Self {
            db,
            dispatcher,
            tick_interval: config.scheduler_interval(),
            refresh_interval: config.refresh_interval(),
            critical_threshold: config.critical_error_threshold,
        }
    }

    /// Run one scheduling pass and return the dispatched feed IDs.
    ///
    /// Does not wait for any cycle to finish.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let feeds: Vec<_> = FeedRepository::new(self.db.pool())
            .list_due_for_refresh(now, self.refresh_interval, self.critical_threshold)
            .await?
            .into_iter()
            .filter(|feed| feed.is_eligible(now, self.refresh_interval, self.critical_threshold))
            .collect();

        if feeds.is_empty() {
            debug!("No feeds due for refresh");
            return Ok(Vec::new());
        }

        info!("Dispatching {} feed(s)", feeds.len());
        let ids: Vec<i64> = feeds.iter().map(|feed| feed.id).collect();
        for id in &ids {
            self.dispatcher.dispatch(*id);
        }
        Ok(ids)
    }

    /// Tick forever at the configured interval.
    pub async fn run(&self) {
        info!(
            "RSS scheduler started (interval: {} seconds)",
            self.tick_interval.as_secs()
        );

        let mut timer = interval(self.tick_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            if let Err(e) = self.tick(Utc::now()).await {
                error!("Failed to select feeds for refresh: {}", e);
            }
        }
    }
}
