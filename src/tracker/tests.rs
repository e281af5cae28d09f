use super::*;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::NewItem;
use crate::database::sqlite::queries::ItemQueries;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

struct CountingHandler {
    name: &'static str,
    calls: AtomicUsize,
}

impl CountingHandler {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeHandler for CountingHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, _row: &PendingRow) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingHandler;

#[async_trait]
impl ChangeHandler for FailingHandler {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn handle(&self, row: &PendingRow) -> anyhow::Result<()> {
        anyhow::bail!("refusing row {}", row.id)
    }
}

async fn create_test_tracker() -> (TempDir, Database, ChangeTracker) {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("can create database");
    let tracker = ChangeTracker::new(database.pool().clone(), "items", "id", "updated_at")
        .expect("can create tracker");
    (temp_dir, database, tracker)
}

async fn insert_item(database: &Database, name: &str) -> Uuid {
    database
        .create_item(NewItem {
            name: name.to_string(),
            description: None,
            category_id: None,
        })
        .await
        .expect("can create item")
        .id
}

#[tokio::test]
async fn attach_is_idempotent() {
    let (_temp_dir, database, tracker) = create_test_tracker().await;

    tracker.attach().await.expect("first attach succeeds");
    tracker.attach().await.expect("second attach succeeds");

    let meta = SchemaMeta::new(database.pool().clone());
    let columns = meta.columns_of("items").await.expect("can read columns");
    let tracked: Vec<_> = columns
        .iter()
        .filter(|c| c.name == "tracked_updated_at")
        .collect();
    assert_eq!(tracked.len(), 1);
}

#[tokio::test]
async fn check_marks_rows_once() {
    let (_temp_dir, database, mut tracker) = create_test_tracker().await;
    tracker.attach().await.expect("can attach");

    insert_item(&database, "chess club").await;

    let handler = CountingHandler::new("counting");
    tracker.add_handler(Arc::clone(&handler) as Arc<dyn ChangeHandler>);

    let stats = tracker.check().await.expect("first check succeeds");
    assert_eq!(
        stats,
        CheckStats {
            pending: 1,
            marked: 1,
            failed: 0
        }
    );
    assert_eq!(handler.calls(), 1);

    // No intervening writes: nothing pending, nothing re-delivered.
    let stats = tracker.check().await.expect("second check succeeds");
    assert_eq!(stats, CheckStats::default());
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn failed_row_stays_pending() {
    let (_temp_dir, database, mut tracker) = create_test_tracker().await;
    tracker.attach().await.expect("can attach");

    let id = insert_item(&database, "chess club").await;

    tracker.add_handler(Arc::new(FailingHandler));

    let stats = tracker.check().await.expect("check succeeds");
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.marked, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(tracker.failure_count(id), 1);

    // The row is re-delivered on the next poll, forever.
    let stats = tracker.check().await.expect("check succeeds");
    assert_eq!(stats.failed, 1);
    assert_eq!(tracker.failure_count(id), 2);
}

#[tokio::test]
async fn first_failure_stops_remaining_handlers() {
    let (_temp_dir, database, mut tracker) = create_test_tracker().await;
    tracker.attach().await.expect("can attach");

    insert_item(&database, "chess club").await;

    let late = CountingHandler::new("late");
    tracker.add_handler(Arc::new(FailingHandler));
    tracker.add_handler(Arc::clone(&late) as Arc<dyn ChangeHandler>);

    let stats = tracker.check().await.expect("check succeeds");
    assert_eq!(stats.failed, 1);
    assert_eq!(late.calls(), 0, "handlers after the failure must not run");
}

#[tokio::test]
async fn other_rows_progress_past_a_poisoned_row() {
    let (_temp_dir, database, mut tracker) = create_test_tracker().await;
    tracker.attach().await.expect("can attach");

    let poisoned = insert_item(&database, "poisoned").await;
    let healthy = insert_item(&database, "healthy").await;

    struct SelectiveHandler {
        reject: Uuid,
    }

    #[async_trait]
    impl ChangeHandler for SelectiveHandler {
        fn name(&self) -> &'static str {
            "selective"
        }

        async fn handle(&self, row: &PendingRow) -> anyhow::Result<()> {
            if row.id == self.reject {
                anyhow::bail!("bad row");
            }
            Ok(())
        }
    }

    tracker.add_handler(Arc::new(SelectiveHandler { reject: poisoned }));

    let stats = tracker.check().await.expect("check succeeds");
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.marked, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(tracker.failure_count(healthy), 0);

    let remaining = tracker.pending_count().await.expect("can count pending");
    assert_eq!(remaining, Some(1));
}

#[tokio::test]
async fn reset_forgets_progress() {
    let (_temp_dir, database, mut tracker) = create_test_tracker().await;
    tracker.attach().await.expect("can attach");

    insert_item(&database, "chess club").await;

    let handler = CountingHandler::new("counting");
    tracker.add_handler(Arc::clone(&handler) as Arc<dyn ChangeHandler>);
    tracker.check().await.expect("check succeeds");
    assert_eq!(handler.calls(), 1);

    tracker.reset().await.expect("can reset");
    assert_eq!(tracker.handler_count(), 0);

    // Tracking column recreated as null: the marked row is pending again.
    tracker.attach().await.expect("can re-attach");
    tracker.add_handler(Arc::clone(&handler) as Arc<dyn ChangeHandler>);
    let stats = tracker.check().await.expect("check succeeds");
    assert_eq!(stats.marked, 1);
    assert_eq!(handler.calls(), 2);
}

#[tokio::test]
async fn repeated_attach_reset_cycles_never_error() {
    // Schema statements go through different pooled connections from one
    // cycle to the next, so this exercises the full pool, not one handle.
    let (_temp_dir, database, mut tracker) = create_test_tracker().await;

    insert_item(&database, "chess club").await;

    for _ in 0..5 {
        tracker.attach().await.expect("attach succeeds");
        tracker.attach().await.expect("repeat attach succeeds");
        assert_eq!(
            tracker.pending_count().await.expect("can count"),
            Some(1),
            "fresh tracking column leaves the row pending"
        );
        tracker.reset().await.expect("reset succeeds");
        assert_eq!(tracker.pending_count().await.expect("can count"), None);
    }
}

#[tokio::test]
async fn updated_row_becomes_pending_again() {
    let (_temp_dir, database, mut tracker) = create_test_tracker().await;
    tracker.attach().await.expect("can attach");

    let id = insert_item(&database, "chess club").await;

    let handler = CountingHandler::new("counting");
    tracker.add_handler(Arc::clone(&handler) as Arc<dyn ChangeHandler>);
    tracker.check().await.expect("check succeeds");
    assert_eq!(handler.calls(), 1);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    ItemQueries::update_content(database.pool(), id, "chess society", None, None)
        .await
        .expect("can update item");

    let stats = tracker.check().await.expect("check succeeds");
    assert_eq!(stats.marked, 1);
    assert_eq!(handler.calls(), 2);
}

#[tokio::test]
async fn duplicate_handler_names_ignored() {
    let (_temp_dir, _database, mut tracker) = create_test_tracker().await;

    let a = CountingHandler::new("same");
    let b = CountingHandler::new("same");
    tracker.add_handler(a);
    tracker.add_handler(b);

    assert_eq!(tracker.handler_count(), 1);
}

#[tokio::test]
async fn detach_clears_handlers_but_keeps_schema() {
    let (_temp_dir, database, mut tracker) = create_test_tracker().await;
    tracker.attach().await.expect("can attach");
    tracker.add_handler(CountingHandler::new("counting"));

    tracker.detach();
    assert_eq!(tracker.handler_count(), 0);

    let meta = SchemaMeta::new(database.pool().clone());
    assert!(
        meta.has_column("items", "tracked_updated_at")
            .await
            .expect("can check column")
    );
}

#[tokio::test]
async fn pending_count_none_before_attach() {
    let (_temp_dir, _database, tracker) = create_test_tracker().await;

    let count = tracker.pending_count().await.expect("can count pending");
    assert_eq!(count, None);
}

#[tokio::test]
async fn invalid_table_name_rejected() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("can create database");

    let result = ChangeTracker::new(database.pool().clone(), "items; --", "id", "updated_at");
    assert!(matches!(result, Err(RecsError::Store(_))));
}
