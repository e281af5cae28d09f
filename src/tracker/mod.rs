//! Poll-based change tracking over one relational table.
//!
//! A tracker owns a nullable tracking timestamp column on its table. A row is
//! pending while that column is null or differs from the row's update
//! timestamp. `check` snapshots the pending set, dispatches each row to the
//! registered handlers, and marks a row processed only when every handler
//! accepted it. Delivery is at-least-once: no row lock is held between the
//! snapshot read and the mark, so a concurrent writer can race a mark and
//! handlers may observe stale row state.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::sqlite::meta::{SchemaMeta, is_missing_column, validate_identifier};
use crate::{RecsError, Result};

const TRACKED_COLUMN_PREFIX: &str = "tracked_";
const TRACKED_COLUMN_TYPE: &str = "TIMESTAMP";

/// One pending row, as snapshotted at poll time. Handlers reload whatever
/// domain state they need by id and must tolerate stale delivery.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PendingRow {
    pub id: Uuid,
    pub updated_at: NaiveDateTime,
}

/// A named processing strategy registered with a tracker. Names are the
/// handler's identity: registering two handlers with the same name is a
/// no-op. Dispatch order is registration order, but handlers must not rely
/// on it for correctness.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, row: &PendingRow) -> anyhow::Result<()>;
}

/// Outcome of one `check` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckStats {
    pub pending: usize,
    pub marked: usize,
    pub failed: usize,
}

pub struct ChangeTracker {
    pool: SqlitePool,
    meta: SchemaMeta,
    table: String,
    id_column: String,
    updated_column: String,
    tracked_column: String,
    handlers: Vec<Arc<dyn ChangeHandler>>,
    failure_counts: HashMap<Uuid, u64>,
}

impl ChangeTracker {
    #[inline]
    pub fn new(pool: SqlitePool, table: &str, id_column: &str, updated_column: &str) -> Result<Self> {
        validate_identifier(table)?;
        validate_identifier(id_column)?;
        validate_identifier(updated_column)?;

        Ok(Self {
            meta: SchemaMeta::new(pool.clone()),
            pool,
            table: table.to_string(),
            id_column: id_column.to_string(),
            updated_column: updated_column.to_string(),
            tracked_column: format!("{TRACKED_COLUMN_PREFIX}{updated_column}"),
            handlers: Vec::new(),
            failure_counts: HashMap::new(),
        })
    }

    #[inline]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[inline]
    pub fn tracked_column(&self) -> &str {
        &self.tracked_column
    }

    /// Ensures the tracking column exists. Idempotent.
    #[inline]
    pub async fn attach(&self) -> Result<()> {
        if self
            .meta
            .add_column_if_missing(&self.table, &self.tracked_column, TRACKED_COLUMN_TYPE)
            .await?
        {
            info!(
                "Attached tracker to {}: added column {}",
                self.table, self.tracked_column
            );
        } else {
            debug!(
                "Tracking column {}.{} already present",
                self.table, self.tracked_column
            );
        }

        Ok(())
    }

    /// Clears the handler set. Does not touch the schema.
    #[inline]
    pub fn detach(&mut self) {
        self.handlers.clear();
    }

    /// Clears handlers and drops the tracking column, forgetting all
    /// progress. Every row becomes pending again after the next `attach`.
    #[inline]
    pub async fn reset(&mut self) -> Result<()> {
        self.handlers.clear();
        self.failure_counts.clear();

        if self
            .meta
            .drop_column_if_exists(&self.table, &self.tracked_column)
            .await?
        {
            info!(
                "Reset tracker on {}: dropped column {}",
                self.table, self.tracked_column
            );
        }

        Ok(())
    }

    /// Registers a handler. Duplicate names are ignored.
    #[inline]
    pub fn add_handler(&mut self, handler: Arc<dyn ChangeHandler>) {
        if self.handlers.iter().any(|h| h.name() == handler.name()) {
            debug!("Handler {} already registered, ignoring", handler.name());
            return;
        }
        self.handlers.push(handler);
    }

    #[inline]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// How many times a row has failed dispatch since this process started.
    #[inline]
    pub fn failure_count(&self, id: Uuid) -> u64 {
        self.failure_counts.get(&id).copied().unwrap_or(0)
    }

    /// Pending row count, or `None` if the tracker is not attached.
    #[inline]
    pub async fn pending_count(&self) -> Result<Option<i64>> {
        let query = format!(
            "SELECT COUNT(*) FROM {table} WHERE {tracked} IS NULL OR {tracked} <> {updated}",
            table = self.table,
            tracked = self.tracked_column,
            updated = self.updated_column,
        );

        match sqlx::query_scalar::<_, i64>(&query)
            .persistent(false)
            .fetch_one(&self.pool)
            .await
        {
            Ok(count) => Ok(Some(count)),
            Err(e) if is_missing_column(&e) => Ok(None),
            Err(e) => Err(RecsError::Store(format!(
                "Failed to count pending rows: {e}"
            ))),
        }
    }

    /// One poll pass: snapshot the pending set, dispatch each row, mark the
    /// rows every handler accepted. Rows that fail stay pending and are
    /// retried on the next pass, indefinitely; the per-row failure counter
    /// makes a permanently failing row visible in the logs.
    #[inline]
    pub async fn check(&mut self) -> Result<CheckStats> {
        let query = format!(
            "SELECT {id} AS id, {updated} AS updated_at FROM {table}
             WHERE {tracked} IS NULL OR {tracked} <> {updated}",
            id = self.id_column,
            updated = self.updated_column,
            table = self.table,
            tracked = self.tracked_column,
        );

        // References the tracker-owned column, which reset/attach drop and
        // recreate, so the statement must not be cached.
        let pending: Vec<PendingRow> = sqlx::query_as(&query)
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                RecsError::Store(format!("Failed to poll {} for changes: {e}", self.table))
            })?;

        let mut stats = CheckStats {
            pending: pending.len(),
            ..CheckStats::default()
        };

        for row in &pending {
            match self.notify(row).await {
                Ok(()) => {
                    self.mark(row.id).await?;
                    self.failure_counts.remove(&row.id);
                    stats.marked += 1;
                }
                Err(e) => {
                    let failures = self.failure_counts.entry(row.id).or_insert(0);
                    *failures += 1;
                    stats.failed += 1;
                    warn!(
                        "Row {} in {} left pending after {} failure(s): {e}",
                        row.id, self.table, failures
                    );
                }
            }
        }

        if stats.pending > 0 {
            debug!(
                "Checked {}: {} pending, {} marked, {} failed",
                self.table, stats.pending, stats.marked, stats.failed
            );
        }

        Ok(stats)
    }

    /// Runs every handler for one row, stopping at the first failure. The
    /// row is only markable if all handlers returned cleanly.
    async fn notify(&self, row: &PendingRow) -> Result<()> {
        for handler in &self.handlers {
            debug!("Dispatching {} row {} to {}", self.table, row.id, handler.name());
            handler.handle(row).await.map_err(|e| {
                RecsError::Handler(format!("{} failed on row {}: {e:#}", handler.name(), row.id))
            })?;
        }
        Ok(())
    }

    /// Sets the tracking column from the row's live update column. If the
    /// row changed again after the snapshot read, the two columns now match
    /// the newer state and the row correctly shows pending on the next poll.
    async fn mark(&self, id: Uuid) -> Result<()> {
        let query = format!(
            "UPDATE {table} SET {tracked} = {updated} WHERE {id_col} = ?",
            table = self.table,
            tracked = self.tracked_column,
            updated = self.updated_column,
            id_col = self.id_column,
        );

        sqlx::query(&query)
            .bind(id)
            .persistent(false)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RecsError::Store(format!("Failed to mark row {id} in {}: {e}", self.table))
            })?;

        Ok(())
    }
}
