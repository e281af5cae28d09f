use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::sqlite::models::{
    FeedEntry, Item, LikeEvent, NewFeedEntry, NewItem, NewLikeEvent, NewTeamRequest, TeamRequest,
};
use crate::database::sqlite::queries::{
    CategoryQueries, FeedQueries, ItemQueries, LikeQueries, TeamRequestQueries,
};


pub mod meta;
pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("recs.db");
        let db_url = db_path.to_string_lossy();

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(db_url.as_ref()).await
    }

    // Item operations
    #[inline]
    pub async fn create_item(&self, new_item: NewItem) -> Result<Item> {
        ItemQueries::create(&self.pool, new_item).await
    }

    #[inline]
    pub async fn get_item_by_id(&self, id: Uuid) -> Result<Option<Item>> {
        ItemQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn category_name(&self, id: Uuid) -> Result<Option<String>> {
        CategoryQueries::name_of(&self.pool, id).await
    }

    // Like operations
    #[inline]
    pub async fn create_like(&self, new_like: NewLikeEvent) -> Result<LikeEvent> {
        LikeQueries::create(&self.pool, new_like).await
    }

    #[inline]
    pub async fn get_like_by_id(&self, id: Uuid) -> Result<Option<LikeEvent>> {
        LikeQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn recent_likes_by_author(&self, author_id: Uuid, limit: usize) -> Result<Vec<LikeEvent>> {
        LikeQueries::recent_by_author(&self.pool, author_id, limit).await
    }

    #[inline]
    pub async fn likes_for_items(&self, item_ids: &[Uuid]) -> Result<Vec<LikeEvent>> {
        LikeQueries::for_items(&self.pool, item_ids).await
    }

    // Feed operations
    #[inline]
    pub async fn create_feed_entry(&self, entry: NewFeedEntry) -> Result<FeedEntry> {
        FeedQueries::create(&self.pool, entry).await
    }

    #[inline]
    pub async fn clear_feed_for_user(&self, user_id: Uuid) -> Result<usize> {
        FeedQueries::clear_for_user(&self.pool, user_id).await
    }

    #[inline]
    pub async fn feed_for_user(&self, user_id: Uuid) -> Result<Vec<FeedEntry>> {
        FeedQueries::list_for_user(&self.pool, user_id).await
    }

    // Team request operations
    #[inline]
    pub async fn create_team_request(&self, request: NewTeamRequest) -> Result<TeamRequest> {
        TeamRequestQueries::create(&self.pool, request).await
    }

    #[inline]
    pub async fn clear_team_requests_for_item(&self, item_id: Uuid) -> Result<usize> {
        TeamRequestQueries::clear_for_item(&self.pool, item_id).await
    }

    #[inline]
    pub async fn team_requests_for_user(&self, user_id: Uuid) -> Result<Vec<TeamRequest>> {
        TeamRequestQueries::list_for_user(&self.pool, user_id).await
    }
}
