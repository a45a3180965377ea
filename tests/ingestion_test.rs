//! Ingestion tests for devnews.
//!
//! These tests drive full ingestion runs and check deduplication, change
//! detection and per-source failure isolation.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use httpmock::prelude::*;
use serde_json::json;

use common::{record, service_with, setup_db, setup_file_db, FailingFetcher, StubFetcher, NEVER};
use devnews::config::IngestConfig;
use devnews::{
    ArticleFilter, ArticleRepository, DevToFetcher, HackerNewsFetcher, HttpClient, RedditFetcher,
    SourceFetcher, UpsertOutcome,
};

#[tokio::test]
async fn test_repeated_runs_do_not_duplicate() {
    let db = setup_db().await;
    let fetcher = StubFetcher::new(
        "stub",
        vec![record("1", "stub"), record("2", "stub"), record("3", "stub")],
    );
    let service = service_with(&db, vec![Box::new(fetcher)], NEVER);

    let first = service.run_ingestion().await;
    let second = service.run_ingestion().await;

    assert_eq!(first.created, 3);
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.items_processed, 3);

    let articles = service.list_articles(&ArticleFilter::new(), 100).await.unwrap();
    assert_eq!(articles.len(), 3);
}

#[tokio::test]
async fn test_changed_record_updates_in_place() {
    let db = setup_db().await;
    let fetcher = StubFetcher::new("stub", vec![record("1", "stub")]);
    let records = fetcher.records_handle();
    let service = service_with(&db, vec![Box::new(fetcher)], NEVER);

    service.run_ingestion().await;
    let repo = ArticleRepository::new(db.pool());
    let before = repo.get_by_key("1", "stub").await.unwrap().unwrap();

    *records.lock().unwrap() = vec![record("1", "stub").with_score(999).with_comment_count(77)];
    let report = service.run_ingestion().await;

    assert_eq!(report.updated, 1);
    let after = repo.get_by_key("1", "stub").await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.score, 999);
    assert_eq!(after.comment_count, 77);
    assert!(after.updated_at >= before.updated_at);
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failing_source_does_not_affect_others() {
    let db = setup_db().await;
    let a = StubFetcher::new("alpha", vec![record("a1", "alpha"), record("a2", "alpha")]);
    let c = StubFetcher::new("gamma", vec![record("c1", "gamma")]);
    let c_calls = c.calls_handle();
    let fetchers: Vec<Box<dyn SourceFetcher>> = vec![
        Box::new(a),
        Box::new(FailingFetcher {
            name: "beta".to_string(),
        }),
        Box::new(c),
    ];
    let service = service_with(&db, fetchers, NEVER);

    let report = service.run_ingestion().await;

    assert_eq!(report.items_processed, 3);
    assert_eq!(report.sources_succeeded, vec!["alpha", "gamma"]);
    assert_eq!(report.sources_failed.len(), 1);
    assert_eq!(report.sources_failed[0].source, "beta");
    assert!(report.sources_failed[0].error.contains("connection refused"));
    assert_eq!(c_calls.load(Ordering::SeqCst), 1);
    assert_eq!(ArticleRepository::new(db.pool()).count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_real_fetchers_against_mock_servers() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/hn/topstories.json");
            then.status(200).json_body(json!([101]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/hn/item/101.json");
            then.status(200).json_body(json!({
                "id": 101, "type": "story", "title": "A story",
                "url": "https://example.org/story", "time": 1757364301,
                "score": 5, "descendants": 1
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/devto/articles");
            then.status(500);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/reddit/r/rust.json");
            then.status(200).json_body(json!({
                "data": {"children": [{"data": {
                    "id": "r1", "title": "Rust post",
                    "permalink": "/r/rust/comments/r1/rust_post/",
                    "is_self": false, "created_utc": 1757364301.0,
                    "score": 42, "num_comments": 7
                }}]}
            }));
        })
        .await;

    let http = HttpClient::new(&IngestConfig::default()).unwrap();
    let fetchers: Vec<Box<dyn SourceFetcher>> = vec![
        Box::new(HackerNewsFetcher::new(http.clone()).with_base_url(server.url("/hn"))),
        Box::new(DevToFetcher::new(http.clone()).with_base_url(server.url("/devto"))),
        Box::new(RedditFetcher::new(http, "rust").with_base_url(server.url("/reddit"))),
    ];
    let db = setup_db().await;
    let service = service_with(&db, fetchers, NEVER);

    let report = service.run_ingestion().await;

    assert_eq!(report.sources_succeeded, vec!["hacker_news", "reddit_rust"]);
    assert_eq!(report.sources_failed[0].source, "dev_to");
    assert_eq!(report.created, 2);

    let repo = ArticleRepository::new(db.pool());
    let reddit = repo.get_by_key("r1", "reddit_rust").await.unwrap().unwrap();
    assert_eq!(reddit.url, "https://reddit.com/r/rust/comments/r1/rust_post/");
    assert!(repo.get_by_key("101", "hacker_news").await.unwrap().is_some());
}

#[tokio::test]
async fn test_concurrent_upserts_of_same_key() {
    let (_dir, db) = setup_file_db().await;
    let db = Arc::new(db);

    const WRITERS: usize = 8;
    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let db = Arc::clone(&db);
        handles.push(tokio::spawn(async move {
            let repo = ArticleRepository::new(db.pool());
            let rec = record("same", "race").with_score(i as i64);
            repo.upsert(&rec).await
        }));
    }

    let mut created = 0;
    for handle in handles {
        let (_, outcome) = handle.await.unwrap().unwrap();
        if outcome == UpsertOutcome::Created {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(ArticleRepository::new(db.pool()).count().await.unwrap(), 1);
}
