//! Recommendation orchestration.
//!
//! Item changes are embedded and inserted into the vector index. New like
//! events turn a user's recent history into a scored feed. New items are
//! matched against everyone who liked similar items to produce team
//! requests.


use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use itertools::Itertools;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{Item, NewFeedEntry, NewTeamRequest};
use crate::embeddings::{Embedder, embed_weighted};
use crate::index::VectorIndex;
use crate::tracker::{ChangeHandler, PendingRow};

const NAME_WEIGHT: f32 = 1.0;
const DESCRIPTION_WEIGHT: f32 = 1.0;
const CATEGORY_WEIGHT: f32 = 5.0;
const FEED_SCORE_SCALE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Neighbors fetched per seed like when building a feed.
    pub neighbors: usize,
    /// How many of the user's most recent likes seed the feed.
    pub seed_likes: usize,
    /// Neighborhood size when matching a new item against past likes.
    pub new_item_neighbors: usize,
    /// How many users receive a team request per new item.
    pub team_request_users: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            neighbors: 10,
            seed_likes: 5,
            new_item_neighbors: 50,
            team_request_users: 5,
        }
    }
}

impl EngineSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            neighbors: config.index.neighbors,
            seed_likes: config.worker.seed_likes,
            new_item_neighbors: config.worker.new_item_neighbors,
            team_request_users: config.worker.team_request_users,
        }
    }
}

pub struct RecommendationEngine {
    database: Database,
    embedder: Arc<dyn Embedder>,
    index: Mutex<VectorIndex>,
    settings: EngineSettings,
}

impl RecommendationEngine {
    #[inline]
    pub fn new(
        database: Database,
        embedder: Arc<dyn Embedder>,
        index: VectorIndex,
        settings: EngineSettings,
    ) -> Self {
        Self {
            database,
            embedder,
            index: Mutex::new(index),
            settings,
        }
    }

    #[inline]
    pub async fn index_len(&self) -> usize {
        self.index.lock().await.len()
    }

    /// Weighted embedding of an item: name and description at weight 1,
    /// the category name at weight 5.
    async fn embed_item(&self, item: &Item) -> Result<Vec<f32>> {
        let category_name = match item.category_id {
            Some(category_id) => self
                .database
                .category_name(category_id)
                .await
                .context("Failed to look up category name")?,
            None => None,
        };

        let vector = embed_weighted(
            self.embedder.as_ref(),
            &[
                (Some(item.name.as_str()), NAME_WEIGHT),
                (item.description.as_deref(), DESCRIPTION_WEIGHT),
                (category_name.as_deref(), CATEGORY_WEIGHT),
            ],
        )
        .with_context(|| format!("Failed to embed item {}", item.id))?;

        Ok(vector)
    }

    /// New or updated item: embed it and append to the index. A changed
    /// item gets a fresh ordinal; its old vector stays behind.
    #[inline]
    pub async fn on_item_changed(&self, item_id: Uuid) -> Result<()> {
        let Some(item) = self.database.get_item_by_id(item_id).await? else {
            warn!("Item {} disappeared before embedding, skipping", item_id);
            return Ok(());
        };

        let vector = self.embed_item(&item).await?;

        let ordinal = self.index.lock().await.insert(item.id, vector)?;
        debug!("Indexed item {} at ordinal {}", item.id, ordinal);

        Ok(())
    }

    /// New like event: rebuild the liking user's feed from their most
    /// recent like history. The feed is cleared first so re-delivery of the
    /// same event is idempotent.
    #[inline]
    pub async fn on_user_liked(&self, like_id: Uuid) -> Result<()> {
        let Some(like) = self.database.get_like_by_id(like_id).await? else {
            warn!("Like {} disappeared before scoring, skipping", like_id);
            return Ok(());
        };

        let seeds = self
            .database
            .recent_likes_by_author(like.author_id, self.settings.seed_likes)
            .await?;

        let mut candidates: Vec<(Uuid, f32)> = Vec::new();

        for seed in &seeds {
            let Some(item) = self.database.get_item_by_id(seed.item_id).await? else {
                debug!("Seed item {} no longer exists, skipping", seed.item_id);
                continue;
            };

            let vector = self.embed_item(&item).await?;
            let neighbors = self
                .index
                .lock()
                .await
                .knn(&vector, self.settings.neighbors)?;

            for neighbor in neighbors {
                let similarity = (1.0 - neighbor.distance) * seed.sign();
                candidates.push((neighbor.item_id, similarity));
            }
        }

        let scored = aggregate_candidates(candidates);

        self.database.clear_feed_for_user(like.author_id).await?;

        for (item_id, score) in &scored {
            self.database
                .create_feed_entry(NewFeedEntry {
                    user_id: like.author_id,
                    item_id: *item_id,
                    score: f64::from(*score) * FEED_SCORE_SCALE,
                })
                .await?;
        }

        info!(
            "Rebuilt feed for user {}: {} entries from {} seed likes",
            like.author_id,
            scored.len(),
            seeds.len()
        );

        Ok(())
    }

    /// New item: find users who liked similar items and invite the most
    /// positive ones with a team request.
    #[inline]
    pub async fn on_new_item(&self, item_id: Uuid) -> Result<()> {
        let Some(item) = self.database.get_item_by_id(item_id).await? else {
            warn!("Item {} disappeared before matching, skipping", item_id);
            return Ok(());
        };

        let vector = self.embed_item(&item).await?;
        let neighbors = self
            .index
            .lock()
            .await
            .knn(&vector, self.settings.new_item_neighbors)?;

        let neighbor_items: Vec<Uuid> = neighbors
            .iter()
            .map(|n| n.item_id)
            .filter(|id| *id != item.id)
            .unique()
            .collect();

        // Delivery is at-least-once and the handler fires on every content
        // change, so the item's requests are rewritten rather than appended.
        self.database.clear_team_requests_for_item(item.id).await?;

        let likes = self.database.likes_for_items(&neighbor_items).await?;
        if likes.is_empty() {
            debug!("No like history near item {}, no team requests", item.id);
            return Ok(());
        }

        let mut positivity: HashMap<Uuid, (f64, usize)> = HashMap::new();
        for like in &likes {
            let entry = positivity.entry(like.author_id).or_insert((0.0, 0));
            if like.is_positive {
                entry.0 += 1.0;
            }
            entry.1 += 1;
        }

        let ranked: Vec<(Uuid, f64)> = positivity
            .into_iter()
            .map(|(user_id, (positive, total))| (user_id, positive / total as f64))
            .sorted_by(|a, b| b.1.total_cmp(&a.1))
            .take(self.settings.team_request_users)
            .collect();

        for (user_id, score) in &ranked {
            self.database
                .create_team_request(NewTeamRequest {
                    user_id: *user_id,
                    item_id: item.id,
                    score: *score,
                })
                .await?;
        }

        info!(
            "Item {}: sent {} team requests from {} nearby like events",
            item.id,
            ranked.len(),
            likes.len()
        );

        Ok(())
    }
}

/// Groups `(item, similarity)` candidates by item and averages the scores.
fn aggregate_candidates(candidates: Vec<(Uuid, f32)>) -> Vec<(Uuid, f32)> {
    let mut grouped: HashMap<Uuid, (f32, usize)> = HashMap::new();
    for (item_id, similarity) in candidates {
        let entry = grouped.entry(item_id).or_insert((0.0, 0));
        entry.0 += similarity;
        entry.1 += 1;
    }

    grouped
        .into_iter()
        .map(|(item_id, (sum, count))| (item_id, sum / count as f32))
        .collect()
}

/// Embeds changed items into the vector index.
pub struct ItemChangedHandler {
    engine: Arc<RecommendationEngine>,
}

impl ItemChangedHandler {
    #[inline]
    pub fn new(engine: Arc<RecommendationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ChangeHandler for ItemChangedHandler {
    fn name(&self) -> &'static str {
        "item-embedding"
    }

    async fn handle(&self, row: &PendingRow) -> Result<()> {
        self.engine.on_item_changed(row.id).await
    }
}

/// Matches changed items against like history to produce team requests.
pub struct NewItemMatchHandler {
    engine: Arc<RecommendationEngine>,
}

impl NewItemMatchHandler {
    #[inline]
    pub fn new(engine: Arc<RecommendationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ChangeHandler for NewItemMatchHandler {
    fn name(&self) -> &'static str {
        "team-request-match"
    }

    async fn handle(&self, row: &PendingRow) -> Result<()> {
        self.engine.on_new_item(row.id).await
    }
}

/// Rebuilds a user's feed when they like or dislike something.
pub struct NewLikeHandler {
    engine: Arc<RecommendationEngine>,
}

impl NewLikeHandler {
    #[inline]
    pub fn new(engine: Arc<RecommendationEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ChangeHandler for NewLikeHandler {
    fn name(&self) -> &'static str {
        "like-feed"
    }

    async fn handle(&self, row: &PendingRow) -> Result<()> {
        self.engine.on_user_liked(row.id).await
    }
}
