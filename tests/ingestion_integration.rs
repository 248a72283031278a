//! End-to-end tests of the ingestion surface against an on-disk database.
//!
//! Nothing here leaves the machine: every target is rejected by the address
//! guard before a connection is made.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::net::TcpListener;

use common::{create_feed, setup_file_db, RecordingDispatcher};
use noticeboard::config::RssConfig;
use noticeboard::rss::{FailureReason, FeedService, HealthStatus, Orchestrator};
use noticeboard::{Config, Database, NoticeboardError};

/// Assert that nothing connected to `listener` within a short window.
async fn assert_no_connection(listener: &TcpListener) {
    let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "a connection reached the local listener");
}

#[tokio::test]
async fn test_loopback_feed_is_blocked_and_recorded() {
    let test_db = setup_file_db().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let service = FeedService::new(test_db.db.clone(), &RssConfig::default());
    let feed = service
        .add_feed("Loopback", &format!("http://127.0.0.1:{port}/feed.rss"))
        .await
        .unwrap();

    let report = service.refresh(feed.id).await.unwrap();
    assert_eq!(report.failure().unwrap().reason, FailureReason::PrivateIp);
    assert_no_connection(&listener).await;

    let feed = service.get_feed(feed.id).await.unwrap();
    assert_eq!(feed.health.error_count, 1);
    assert_eq!(service.health_of(&feed), HealthStatus::Warning);
    assert!(feed.health.last_error.is_some());
}

#[tokio::test]
async fn test_internal_targets_fail_with_private_ip() {
    let test_db = setup_file_db().await;
    let service = FeedService::new(test_db.db.clone(), &RssConfig::default());

    for url in [
        "http://localhost/feed.rss",
        "http://LOCALHOST./feed.rss",
        "http://printer.local/feed.rss",
        "http://wiki.corp/feed.rss",
        "http://10.0.0.5/feed.rss",
        "http://192.168.1.1/feed.rss",
        "http://169.254.169.254/latest/meta-data/",
        "http://[::1]/feed.rss",
        "http://[fd00::1]/feed.rss",
        "http://[::ffff:127.0.0.1]/feed.rss",
    ] {
        let feed = service.add_feed(url, url).await.unwrap();
        let report = service.refresh(feed.id).await.unwrap();
        assert_eq!(
            report.failure().map(|f| f.reason),
            Some(FailureReason::PrivateIp),
            "{url}"
        );
    }
}

#[tokio::test]
async fn test_critical_feed_skipped_by_scheduler_but_manual_refresh_attempts() {
    let test_db = setup_file_db().await;
    let db = test_db.db.clone();
    let config = RssConfig::default();
    let service = FeedService::new(db.clone(), &config);
    let feed_id = create_feed(&db, "Broken", "http://127.0.0.1/feed.rss").await;

    for expected in 1..=3 {
        let report = service.refresh(feed_id).await.unwrap();
        assert!(!report.is_skipped());
        assert_eq!(
            service.get_feed(feed_id).await.unwrap().health.error_count,
            expected
        );
    }
    let feed = service.get_feed(feed_id).await.unwrap();
    assert_eq!(service.health_of(&feed), HealthStatus::Critical);
    assert_eq!(service.list_unhealthy().await.unwrap().len(), 1);

    let dispatcher = Arc::new(RecordingDispatcher::default());
    let orchestrator = Orchestrator::new(db.clone(), dispatcher.clone(), &config);
    let later = Utc::now() + chrono::Duration::hours(3);
    assert!(orchestrator.tick(later).await.unwrap().is_empty());
    assert!(dispatcher.dispatched().is_empty());

    // Manual refresh is still attempted and recorded
    let report = service.refresh(feed_id).await.unwrap();
    assert_eq!(report.failure().unwrap().reason, FailureReason::PrivateIp);
    assert_eq!(
        service.get_feed(feed_id).await.unwrap().health.error_count,
        4
    );
}

#[tokio::test]
async fn test_scheduler_dispatches_new_feeds_once_per_interval() {
    let test_db = setup_file_db().await;
    let db = test_db.db.clone();
    let config = RssConfig::default();
    let a = create_feed(&db, "A", "https://example.com/a.xml").await;
    let b = create_feed(&db, "B", "https://example.com/b.xml").await;

    let dispatcher = Arc::new(RecordingDispatcher::default());
    let orchestrator = Orchestrator::new(db, dispatcher.clone(), &config);

    let mut ids = orchestrator.tick(Utc::now()).await.unwrap();
    ids.sort();
    assert_eq!(ids, vec![a, b]);
    assert_eq!(dispatcher.dispatched().len(), 2);
}

#[tokio::test]
async fn test_database_reopen_keeps_data() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("noticeboard.db");

    let db = Database::open(&path).await.unwrap();
    let id = create_feed(&db, "Persisted", "https://example.com/feed.xml").await;
    let version = db.schema_version().await.unwrap();
    db.close().await;

    let db = Database::open(&path).await.unwrap();
    assert_eq!(db.schema_version().await.unwrap(), version);
    let service = FeedService::new(db, &RssConfig::default());
    assert_eq!(service.get_feed(id).await.unwrap().name, "Persisted");
}

#[tokio::test]
async fn test_unknown_feed_refresh() {
    let test_db = setup_file_db().await;
    let service = FeedService::new(test_db.db.clone(), &RssConfig::default());

    let err = service.refresh(77).await.unwrap_err();
    assert!(matches!(err, NoticeboardError::NotFound(_)));
}

#[test]
fn test_config_from_toml() {
    let config = Config::parse(
        r#"
[database]
path = "/var/lib/noticeboard/board.db"

[rss]
refresh_interval_secs = 1800
critical_error_threshold = 5
manual_refresh_respects_health_gate = true
"#,
    )
    .unwrap();

    assert!(config.validate().is_ok());
    assert_eq!(config.database.path, "/var/lib/noticeboard/board.db");
    assert_eq!(config.rss.refresh_interval_secs, 1800);
    assert_eq!(config.rss.critical_error_threshold, 5);
    assert!(config.rss.manual_refresh_respects_health_gate);
    assert_eq!(config.rss.max_redirects, 3);
    assert_eq!(config.logging.level, "info");
}
