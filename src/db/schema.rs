//! Database schema and migrations.
//!
//! Migrations are applied in order when the database is opened. The
//! `schema_version` table tracks which ones have already run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Feed sources registered by operators
    r#"
CREATE TABLE rss_feeds (
    id                        INTEGER PRIMARY KEY AUTOINCREMENT,
    name                      TEXT NOT NULL,
    url                       TEXT NOT NULL,
    active                    INTEGER NOT NULL DEFAULT 1,
    last_fetched_at           TEXT,
    last_successful_fetch_at  TEXT,
    error_count               INTEGER NOT NULL DEFAULT 0 CHECK (error_count >= 0),
    last_error                TEXT CHECK (last_error IS NULL OR length(last_error) <= 1000),
    created_at                TEXT NOT NULL,
    updated_at                TEXT NOT NULL
);

CREATE UNIQUE INDEX idx_rss_feeds_url ON rss_feeds(url);
CREATE INDEX idx_rss_feeds_active ON rss_feeds(active);
CREATE INDEX idx_rss_feeds_error_count ON rss_feeds(error_count);
"#,
    // v2: Items extracted from feeds, unique per (feed, guid)
    r#"
CREATE TABLE rss_feed_items (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_id       INTEGER NOT NULL REFERENCES rss_feeds(id) ON DELETE CASCADE,
    title         TEXT NOT NULL,
    description   TEXT,
    link          TEXT,
    guid          TEXT NOT NULL,
    published_at  TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE UNIQUE INDEX idx_rss_feed_items_feed_guid ON rss_feed_items(feed_id, guid);
CREATE INDEX idx_rss_feed_items_feed_published ON rss_feed_items(feed_id, published_at);
"#,
];
