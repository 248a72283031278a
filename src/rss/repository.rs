//! Feed and item repositories.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::types::{CandidateItem, Feed, FeedHealth, Item, NewFeed};
use crate::datetime::{format_timestamp, parse_timestamp};
use crate::db::{DbPool, SQL_TRUE};
use crate::{NoticeboardError, Result};

const FEED_COLUMNS: &str = "id, name, url, active, last_fetched_at, last_successful_fetch_at, \
                            error_count, last_error, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, feed_id, title, description, link, guid, published_at, created_at";

/// Row type for a feed from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedRow {
    id: i64,
    name: String,
    url: String,
    active: bool,
    last_fetched_at: Option<String>,
    last_successful_fetch_at: Option<String>,
    error_count: i64,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            name: row.name,
            url: row.url,
            active: row.active,
            health: FeedHealth {
                error_count: row.error_count,
                last_error: row.last_error,
                last_fetched_at: row.last_fetched_at.and_then(|s| parse_timestamp(&s)),
                last_successful_fetch_at: row
                    .last_successful_fetch_at
                    .and_then(|s| parse_timestamp(&s)),
            },
            created_at: parse_timestamp(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&row.updated_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Row type for an item from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ItemRow {
    id: i64,
    feed_id: i64,
    title: String,
    description: Option<String>,
    link: Option<String>,
    guid: String,
    published_at: String,
    created_at: String,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            feed_id: row.feed_id,
            title: row.title,
            description: row.description,
            link: row.link,
            guid: row.guid,
            published_at: parse_timestamp(&row.published_at).unwrap_or_else(Utc::now),
            created_at: parse_timestamp(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Repository for feed sources.
pub struct FeedRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new feed. A URL that is already registered is a validation
    /// error.
    pub async fn create(&self, feed: &NewFeed, now: DateTime<Utc>) -> Result<Feed> {
        let now = format_timestamp(&now);
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rss_feeds (name, url, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(feed.name.trim())
        .bind(&feed.url)
        .bind(feed.active)
        .bind(&now)
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| url_conflict(e, &feed.url))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| NoticeboardError::NotFound("feed".into()))
    }

    /// Get a feed by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Feed>> {
        let query = format!("SELECT {FEED_COLUMNS} FROM rss_feeds WHERE id = $1");
        let row = sqlx::query_as::<_, FeedRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Feed::from))
    }

    /// List all feeds, ordered by name.
    pub async fn list_all(&self) -> Result<Vec<Feed>> {
        let query = format!("SELECT {FEED_COLUMNS} FROM rss_feeds ORDER BY name ASC, id ASC");
        let rows = sqlx::query_as::<_, FeedRow>(&query)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// List feeds the scheduler should refresh now.
    ///
    /// Active, below the critical threshold, and never fetched or last
    /// fetched at least `interval` ago. Least recently fetched first.
    pub async fn list_due_for_refresh(
        &self,
        now: DateTime<Utc>,
        interval: chrono::Duration,
        critical_threshold: i64,
    ) -> Result<Vec<Feed>> {
        let cutoff = format_timestamp(&(now - interval));
        let query = format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM rss_feeds
            WHERE active = {SQL_TRUE}
              AND error_count < $1
              AND (last_fetched_at IS NULL OR last_fetched_at <= $2)
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            "#
        );
        let rows = sqlx::query_as::<_, FeedRow>(&query)
            .bind(critical_threshold)
            .bind(cutoff)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// List feeds at or above the critical threshold, worst first.
    pub async fn list_unhealthy(&self, critical_threshold: i64) -> Result<Vec<Feed>> {
        let query = format!(
            "SELECT {FEED_COLUMNS} FROM rss_feeds WHERE error_count >= $1 \
             ORDER BY error_count DESC, name ASC"
        );
        let rows = sqlx::query_as::<_, FeedRow>(&query)
            .bind(critical_threshold)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// Read the health fields of a feed.
    pub async fn get_health(&self, id: i64) -> Result<Option<FeedHealth>> {
        Ok(self.get_by_id(id).await?.map(|feed| feed.health))
    }

    /// Overwrite all four health fields if the stored ones still match
    /// `expected`.
    ///
    /// Returns false if the feed is gone or another writer got there first.
    /// `error_count` and `last_fetched_at` change on every recorded cycle, so
    /// comparing those two is enough.
    pub async fn update_health(
        &self,
        id: i64,
        expected: &FeedHealth,
        health: &FeedHealth,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE rss_feeds
            SET error_count = $1,
                last_error = $2,
                last_fetched_at = $3,
                last_successful_fetch_at = $4,
                updated_at = $5
            WHERE id = $6
              AND error_count = $7
              AND last_fetched_at IS $8
            "#,
        )
        .bind(health.error_count)
        .bind(&health.last_error)
        .bind(health.last_fetched_at.as_ref().map(format_timestamp))
        .bind(health.last_successful_fetch_at.as_ref().map(format_timestamp))
        .bind(format_timestamp(&now))
        .bind(id)
        .bind(expected.error_count)
        .bind(expected.last_fetched_at.as_ref().map(format_timestamp))
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Activate or deactivate a feed.
    pub async fn set_active(&self, id: i64, active: bool, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE rss_feeds SET active = $1, updated_at = $2 WHERE id = $3")
            .bind(active)
            .bind(format_timestamp(&now))
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace a feed's name, URL and active flag, leaving its health alone.
    ///
    /// Returns false if the feed is gone. A URL registered to another feed
    /// is a validation error.
    pub async fn update(&self, id: i64, feed: &NewFeed, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE rss_feeds
            SET name = $1, url = $2, active = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(feed.name.trim())
        .bind(&feed.url)
        .bind(feed.active)
        .bind(format_timestamp(&now))
        .bind(id)
        .execute(self.pool)
        .await
        .map_err(|e| url_conflict(e, &feed.url))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a feed and, by cascade, its items.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rss_feeds WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn url_conflict(e: sqlx::Error, url: &str) -> NoticeboardError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            NoticeboardError::Validation(format!("feed URL already registered: {url}"))
        }
        e => NoticeboardError::from(e),
    }
}

/// Repository for feed items.
pub struct ItemRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ItemRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// All guids already stored for a feed.
    pub async fn existing_guids(&self, feed_id: i64) -> Result<HashSet<String>> {
        let guids: Vec<String> =
            sqlx::query_scalar("SELECT guid FROM rss_feed_items WHERE feed_id = $1")
                .bind(feed_id)
                .fetch_all(self.pool)
                .await?;

        Ok(guids.into_iter().collect())
    }

    /// Insert one item.
    ///
    /// This is a plain INSERT: a duplicate `(feed_id, guid)` is reported as
    /// an error, not silently ignored.
    pub async fn insert(
        &self,
        feed_id: i64,
        item: &CandidateItem,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rss_feed_items (feed_id, title, description, link, guid, published_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(feed_id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.link)
        .bind(&item.guid)
        .bind(format_timestamp(&item.published_at))
        .bind(format_timestamp(&now))
        .fetch_one(self.pool)
        .await?;

        Ok(id)
    }

    /// Items of one feed, newest first.
    pub async fn list_by_feed(&self, feed_id: i64, limit: i64) -> Result<Vec<Item>> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM rss_feed_items WHERE feed_id = $1 \
             ORDER BY published_at DESC, created_at DESC, id DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, ItemRow>(&query)
            .bind(feed_id)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    /// Most recent items of active feeds, for the dashboard.
    pub async fn recent(&self, limit: i64) -> Result<Vec<Item>> {
        let query = format!(
            r#"
            SELECT i.id, i.feed_id, i.title, i.description, i.link, i.guid,
                   i.published_at, i.created_at
            FROM rss_feed_items i
            JOIN rss_feeds f ON f.id = i.feed_id
            WHERE f.active = {SQL_TRUE}
            ORDER BY i.published_at DESC, i.created_at DESC, i.id DESC
            LIMIT $1
            "#
        );
        let rows = sqlx::query_as::<_, ItemRow>(&query)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    /// Number of stored items for a feed.
    pub async fn count_by_feed(&self, feed_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rss_feed_items WHERE feed_id = $1")
            .bind(feed_id)
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }
}
