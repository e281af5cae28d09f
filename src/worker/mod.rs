//! Long-running poll driver.
//!
//! Alternates `check` calls between the items tracker and the likes tracker
//! with a fixed sleep in between. A failed cycle is logged and retried after
//! the next sleep. Shutdown is process termination; there is no drain.


use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::Config;
use crate::database::sqlite::Database;
use crate::database::sqlite::queries::ItemQueries;
use crate::embeddings::EmbeddingClient;
use crate::engine::{
    EngineSettings, ItemChangedHandler, NewItemMatchHandler, NewLikeHandler, RecommendationEngine,
};
use crate::index::VectorIndex;
use crate::tracker::ChangeTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStatus {
    pub items_total: i64,
    pub items_pending: Option<i64>,
    pub likes_pending: Option<i64>,
    pub indexed_vectors: usize,
}

pub struct Worker {
    config: Config,
    database: Database,
    engine: Arc<RecommendationEngine>,
    items_tracker: ChangeTracker,
    likes_tracker: ChangeTracker,
}

impl Worker {
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        let database = Database::initialize_from_config_dir(&config.base_dir)
            .await
            .context("Failed to initialize SQLite database")?;

        let embedder =
            EmbeddingClient::new(&config.embedder).context("Failed to initialize embedding client")?;

        let index = VectorIndex::new(config.index.capacity, config.embedder.dimension as usize);

        let engine = Arc::new(RecommendationEngine::new(
            database.clone(),
            Arc::new(embedder),
            index,
            EngineSettings::from_config(&config),
        ));

        let items_tracker =
            ChangeTracker::new(database.pool().clone(), "items", "id", "updated_at")?;
        let likes_tracker =
            ChangeTracker::new(database.pool().clone(), "likes", "id", "updated_at")?;

        Ok(Self {
            config,
            database,
            engine,
            items_tracker,
            likes_tracker,
        })
    }

    /// Attach both trackers and register the engine's handlers. With
    /// `reindex`, the items tracker is reset first so every item is
    /// re-embedded from scratch into the empty index.
    #[inline]
    pub async fn prepare(&mut self, reindex: bool) -> Result<()> {
        if reindex {
            info!("Cold start requested: resetting item tracking progress");
            self.items_tracker.reset().await?;
        }

        self.items_tracker.attach().await?;
        self.likes_tracker.attach().await?;

        self.items_tracker
            .add_handler(Arc::new(ItemChangedHandler::new(Arc::clone(&self.engine))));
        self.items_tracker
            .add_handler(Arc::new(NewItemMatchHandler::new(Arc::clone(&self.engine))));
        self.likes_tracker
            .add_handler(Arc::new(NewLikeHandler::new(Arc::clone(&self.engine))));

        Ok(())
    }

    /// Run the poll loop until the process is killed.
    #[inline]
    pub async fn start(&mut self, reindex: bool) -> Result<()> {
        self.prepare(reindex).await?;

        let interval = Duration::from_secs(self.config.worker.poll_interval_secs);
        info!(
            "Starting recommendation worker, polling every {:?}",
            interval
        );

        #[expect(
            clippy::infinite_loop,
            reason = "intended to run until the process is terminated"
        )]
        loop {
            if let Err(e) = self.poll_once().await {
                error!("Poll cycle failed: {e:#}");
            }
            sleep(interval).await;
        }
    }

    /// One poll cycle: items first, then likes, so an item referenced by a
    /// fresh like is usually already indexed.
    #[inline]
    pub async fn poll_once(&mut self) -> Result<()> {
        self.items_tracker.check().await?;
        self.likes_tracker.check().await?;
        Ok(())
    }

    #[inline]
    pub async fn status(&self) -> Result<WorkerStatus> {
        Ok(WorkerStatus {
            items_total: ItemQueries::count(self.database.pool()).await?,
            items_pending: self.items_tracker.pending_count().await?,
            likes_pending: self.likes_tracker.pending_count().await?,
            indexed_vectors: self.engine.index_len().await,
        })
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }
}
