//! Test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Mutex;

use chrono::Utc;
use tempfile::TempDir;

use noticeboard::rss::{CandidateItem, Dispatch, FeedRepository, NewFeed};
use noticeboard::Database;

/// Database file in a temporary directory, removed on drop.
pub struct TestDb {
    pub db: Database,
    _dir: TempDir,
}

/// Open a fresh on-disk database.
pub async fn setup_file_db() -> TestDb {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("data").join("noticeboard.db"))
        .await
        .unwrap();
    TestDb { db, _dir: dir }
}

/// Register a feed and return its ID.
pub async fn create_feed(db: &Database, name: &str, url: &str) -> i64 {
    FeedRepository::new(db.pool())
        .create(&NewFeed::new(name, url), Utc::now())
        .await
        .unwrap()
        .id
}

/// A candidate item with the given guid.
pub fn candidate(guid: &str) -> CandidateItem {
    CandidateItem {
        title: format!("Item {guid}"),
        description: Some("Body".to_string()),
        link: Some(format!("https://example.com/{guid}")),
        guid: guid.to_string(),
        published_at: Utc::now(),
    }
}

/// Dispatcher that only records what it was given.
#[derive(Default)]
pub struct RecordingDispatcher {
    dispatched: Mutex<Vec<i64>>,
}

impl RecordingDispatcher {
    pub fn dispatched(&self) -> Vec<i64> {
        self.dispatched.lock().unwrap().clone()
    }
}

impl Dispatch for RecordingDispatcher {
    fn dispatch(&self, feed_id: i64) {
        self.dispatched.lock().unwrap().push(feed_id);
    }
}
