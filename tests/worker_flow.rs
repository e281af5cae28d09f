//! End-to-end worker flow against a mocked embedding endpoint: rows are
//! picked up by the trackers, embedded over HTTP, and turned into feed and
//! team request rows.

use recs_worker::config::Config;
use recs_worker::database::sqlite::models::{NewItem, NewLikeEvent};
use recs_worker::database::sqlite::queries::ItemQueries;
use recs_worker::worker::Worker;
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIMENSION: u32 = 64;

async fn start_embedding_server() -> MockServer {
    let server = MockServer::start().await;

    // Every prompt gets the same unit-direction vector, which is all the
    // flow needs: identical vectors sit at cosine distance zero.
    let embedding: Vec<f32> = vec![0.25; DIMENSION as usize];
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embedding": embedding })))
        .mount(&server)
        .await;

    server
}

async fn create_test_worker(server: &MockServer) -> (TempDir, Worker) {
    let temp_dir = TempDir::new().expect("can create temp dir");

    let mut config = Config::load(temp_dir.path()).expect("can load defaults");
    let address = server.address();
    config.embedder.host = address.ip().to_string();
    config.embedder.port = address.port();
    config.embedder.dimension = DIMENSION;

    let worker = Worker::new(config).await.expect("can create worker");
    (temp_dir, worker)
}

#[tokio::test(flavor = "multi_thread")]
async fn poll_cycle_builds_feed_from_tracked_changes() {
    let server = start_embedding_server().await;
    let (_temp_dir, mut worker) = create_test_worker(&server).await;
    let user = Uuid::new_v4();

    worker.prepare(false).await.expect("can prepare");

    let item = worker
        .database()
        .create_item(NewItem {
            name: "chess club".to_string(),
            description: Some("weekly matches".to_string()),
            category_id: None,
        })
        .await
        .expect("can create item");
    worker
        .database()
        .create_like(NewLikeEvent {
            author_id: user,
            item_id: item.id,
            is_positive: true,
        })
        .await
        .expect("can create like");

    let status = worker.status().await.expect("can get status");
    assert_eq!(status.items_pending, Some(1));
    assert_eq!(status.likes_pending, Some(1));

    // Items are checked before likes, so one cycle indexes the item and
    // then scores the feed against it.
    worker.poll_once().await.expect("can poll");

    let status = worker.status().await.expect("can get status");
    assert_eq!(status.items_pending, Some(0));
    assert_eq!(status.likes_pending, Some(0));
    assert_eq!(status.indexed_vectors, 1);

    let feed = worker
        .database()
        .feed_for_user(user)
        .await
        .expect("can read feed");
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].item_id, item.id);
    assert!((feed[0].score - 100.0).abs() < 1e-3);
}

#[tokio::test(flavor = "multi_thread")]
async fn updated_item_is_picked_up_again() {
    let server = start_embedding_server().await;
    let (_temp_dir, mut worker) = create_test_worker(&server).await;

    worker.prepare(false).await.expect("can prepare");

    let item = worker
        .database()
        .create_item(NewItem {
            name: "garden club".to_string(),
            description: None,
            category_id: None,
        })
        .await
        .expect("can create item");

    worker.poll_once().await.expect("first poll");
    let status = worker.status().await.expect("can get status");
    assert_eq!(status.items_pending, Some(0));
    assert_eq!(status.indexed_vectors, 1);

    ItemQueries::update_content(
        worker.database().pool(),
        item.id,
        "garden club",
        Some("now with potting workshops"),
        None,
    )
    .await
    .expect("can update item");

    let status = worker.status().await.expect("can get status");
    assert_eq!(status.items_pending, Some(1), "content change is pending again");

    worker.poll_once().await.expect("second poll");
    let status = worker.status().await.expect("can get status");
    assert_eq!(status.items_pending, Some(0));
    assert_eq!(
        status.indexed_vectors, 2,
        "reindexed item gets a fresh ordinal"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn new_item_sends_team_requests_to_past_likers() {
    let server = start_embedding_server().await;
    let (_temp_dir, mut worker) = create_test_worker(&server).await;
    let fan = Uuid::new_v4();

    worker.prepare(false).await.expect("can prepare");

    let existing = worker
        .database()
        .create_item(NewItem {
            name: "chess club".to_string(),
            description: Some("weekly matches".to_string()),
            category_id: None,
        })
        .await
        .expect("can create item");
    worker
        .database()
        .create_like(NewLikeEvent {
            author_id: fan,
            item_id: existing.id,
            is_positive: true,
        })
        .await
        .expect("can create like");

    worker.poll_once().await.expect("first poll");

    let fresh = worker
        .database()
        .create_item(NewItem {
            name: "chess tournament".to_string(),
            description: Some("weekend bracket".to_string()),
            category_id: None,
        })
        .await
        .expect("can create item");

    worker.poll_once().await.expect("second poll");

    let requests = worker
        .database()
        .team_requests_for_user(fan)
        .await
        .expect("can read requests");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].item_id, fresh.id);
    assert!((requests[0].score - 1.0).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_outage_leaves_rows_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let (_temp_dir, mut worker) = create_test_worker(&server).await;
    worker.prepare(false).await.expect("can prepare");

    worker
        .database()
        .create_item(NewItem {
            name: "chess club".to_string(),
            description: None,
            category_id: None,
        })
        .await
        .expect("can create item");

    // The poll cycle itself succeeds; the row just stays pending.
    worker.poll_once().await.expect("poll survives handler failure");

    let status = worker.status().await.expect("can get status");
    assert_eq!(status.items_pending, Some(1));
    assert_eq!(status.indexed_vectors, 0);
}
