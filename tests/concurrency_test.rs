//! Concurrency tests.
//!
//! Overlapping cycles for the same feed share nothing but the database. The
//! unique (feed_id, guid) index keeps item insertion idempotent and health
//! writes are compare-and-set, so no recorded failure is lost.

mod common;

use chrono::Utc;

use common::{candidate, create_feed, setup_file_db};
use noticeboard::rss::{
    persist_items, CycleOutcome, FailureReason, FeedRepository, FetchFailure, HealthTracker,
    ItemRepository,
};

/// Many cycles persisting the same document at once store each item once.
#[tokio::test]
async fn test_concurrent_persist_same_items() {
    let test_db = setup_file_db().await;
    let db = test_db.db.clone();
    let feed_id = create_feed(&db, "News", "https://example.com/feed.xml").await;

    const NUM_CYCLES: usize = 8;
    let candidates: Vec<_> = (0..20).map(|n| candidate(&format!("guid-{n}"))).collect();

    let mut handles = Vec::new();
    for _ in 0..NUM_CYCLES {
        let db = db.clone();
        let candidates = candidates.clone();
        handles.push(tokio::spawn(async move {
            persist_items(&db, feed_id, &candidates, Utc::now())
                .await
                .unwrap()
        }));
    }

    let mut created = 0;
    for handle in handles {
        created += handle.await.unwrap();
    }

    assert_eq!(created, 20);
    assert_eq!(
        ItemRepository::new(db.pool())
            .count_by_feed(feed_id)
            .await
            .unwrap(),
        20
    );
}

/// Concurrent health writes never leave the row inconsistent.
#[tokio::test]
async fn test_concurrent_health_records() {
    let test_db = setup_file_db().await;
    let db = test_db.db.clone();
    let feed_id = create_feed(&db, "News", "https://example.com/feed.xml").await;
    let tracker = HealthTracker::new(db.clone(), 3);

    let mut handles = Vec::new();
    for n in 0..10 {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move {
            let outcome = if n % 2 == 0 {
                CycleOutcome::Success
            } else {
                CycleOutcome::Failure(FetchFailure::new(FailureReason::Timeout, "timed out"))
            };
            tracker.record(feed_id, &outcome, Utc::now()).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let health = FeedRepository::new(db.pool())
        .get_health(feed_id)
        .await
        .unwrap()
        .unwrap();
    assert!(health.error_count >= 0 && health.error_count <= 10);
    assert!(health.last_fetched_at.is_some());
    if health.error_count == 0 {
        assert!(health.last_error.is_none());
    } else {
        assert_eq!(health.last_error.as_deref(), Some("timed out"));
    }
}

/// Every concurrently recorded failure adds exactly one to the error count.
#[tokio::test]
async fn test_concurrent_failures_all_counted() {
    let test_db = setup_file_db().await;
    let db = test_db.db.clone();
    let feed_id = create_feed(&db, "News", "https://example.com/feed.xml").await;
    let tracker = HealthTracker::new(db.clone(), 3);

    const NUM_FAILURES: i64 = 10;
    let mut handles = Vec::new();
    for n in 0..NUM_FAILURES {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move {
            let failure = FetchFailure::new(FailureReason::Timeout, format!("timed out {n}"));
            tracker
                .record(feed_id, &CycleOutcome::Failure(failure), Utc::now())
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let health = FeedRepository::new(db.pool())
        .get_health(feed_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(health.error_count, NUM_FAILURES);
    assert!(health.last_error.unwrap().starts_with("timed out"));
}
