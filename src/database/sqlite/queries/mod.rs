
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

pub struct ItemQueries;

impl ItemQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_item: NewItem) -> Result<Item> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO items (id, name, description, category_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(&new_item.name)
        .bind(&new_item.description)
        .bind(new_item.category_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create item")?;

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created item"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Item>> {
        let result = sqlx::query_as::<_, Item>(
            "SELECT id, name, description, category_id, created_at, updated_at
             FROM items WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get item by id")?;

        Ok(result)
    }

    /// Rewrites the item's content and bumps `updated_at`, which makes the
    /// row pending again for any attached tracker.
    #[inline]
    pub async fn update_content(
        pool: &SqlitePool,
        id: Uuid,
        name: &str,
        description: Option<&str>,
        category_id: Option<Uuid>,
    ) -> Result<Option<Item>> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            "UPDATE items SET name = ?, description = ?, category_id = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(category_id)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update item")?;

        Self::get_by_id(pool, id).await
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM items")
            .fetch_one(pool)
            .await
            .context("Failed to count items")?;

        Ok(count)
    }
}

pub struct CategoryQueries;

impl CategoryQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, name: &str) -> Result<Category> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO categories (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create category")?;

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created category"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Category>> {
        let result = sqlx::query_as::<_, Category>(
            "SELECT id, name, created_at, updated_at FROM categories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get category by id")?;

        Ok(result)
    }

    #[inline]
    pub async fn name_of(pool: &SqlitePool, id: Uuid) -> Result<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to look up category name")?;

        Ok(name)
    }
}

pub struct LikeQueries;

impl LikeQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_like: NewLikeEvent) -> Result<LikeEvent> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO likes (id, author_id, item_id, is_positive, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(new_like.author_id)
        .bind(new_like.item_id)
        .bind(new_like.is_positive)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create like event")?;

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created like event"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<LikeEvent>> {
        let result = sqlx::query_as::<_, LikeEvent>(
            "SELECT id, author_id, item_id, is_positive, created_at, updated_at
             FROM likes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get like event by id")?;

        Ok(result)
    }

    /// The author's like history, newest first.
    #[inline]
    pub async fn recent_by_author(
        pool: &SqlitePool,
        author_id: Uuid,
        limit: usize,
    ) -> Result<Vec<LikeEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let likes = sqlx::query_as::<_, LikeEvent>(
            "SELECT id, author_id, item_id, is_positive, created_at, updated_at
             FROM likes WHERE author_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(author_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to get recent likes by author")?;

        Ok(likes)
    }

    /// Every like event whose item is in `item_ids`.
    #[inline]
    pub async fn for_items(pool: &SqlitePool, item_ids: &[Uuid]) -> Result<Vec<LikeEvent>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; item_ids.len()].join(", ");
        let query_str = format!(
            "SELECT id, author_id, item_id, is_positive, created_at, updated_at
             FROM likes WHERE item_id IN ({placeholders})"
        );

        let mut query = sqlx::query_as::<_, LikeEvent>(&query_str);
        for item_id in item_ids {
            query = query.bind(item_id);
        }

        let likes = query
            .fetch_all(pool)
            .await
            .context("Failed to get likes for item set")?;

        Ok(likes)
    }
}

pub struct FeedQueries;

impl FeedQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, entry: NewFeedEntry) -> Result<FeedEntry> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO feed (user_id, item_id, score, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.user_id)
        .bind(entry.item_id)
        .bind(entry.score)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create feed entry")?;

        Ok(FeedEntry {
            user_id: entry.user_id,
            item_id: entry.item_id,
            score: entry.score,
            created_at: now,
            updated_at: now,
        })
    }

    #[inline]
    pub async fn clear_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<usize> {
        let result = sqlx::query("DELETE FROM feed WHERE user_id = ?")
            .bind(user_id)
            .execute(pool)
            .await
            .context("Failed to clear feed for user")?;

        debug!(
            "Cleared {} feed entries for user {}",
            result.rows_affected(),
            user_id
        );
        Ok(result.rows_affected() as usize)
    }

    #[inline]
    pub async fn list_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<FeedEntry>> {
        let entries = sqlx::query_as::<_, FeedEntry>(
            "SELECT user_id, item_id, score, created_at, updated_at
             FROM feed WHERE user_id = ?
             ORDER BY score DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list feed for user")?;

        Ok(entries)
    }
}

pub struct TeamRequestQueries;

impl TeamRequestQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, request: NewTeamRequest) -> Result<TeamRequest> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            "INSERT INTO team_requests (id, user_id, item_id, score, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(request.user_id)
        .bind(request.item_id)
        .bind(request.score)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create team request")?;

        Ok(TeamRequest {
            id,
            user_id: request.user_id,
            item_id: request.item_id,
            score: request.score,
            created_at: now,
            updated_at: now,
        })
    }

    #[inline]
    pub async fn clear_for_item(pool: &SqlitePool, item_id: Uuid) -> Result<usize> {
        let result = sqlx::query("DELETE FROM team_requests WHERE item_id = ?")
            .bind(item_id)
            .execute(pool)
            .await
            .context("Failed to clear team requests for item")?;

        debug!(
            "Cleared {} team requests for item {}",
            result.rows_affected(),
            item_id
        );
        Ok(result.rows_affected() as usize)
    }

    #[inline]
    pub async fn list_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<TeamRequest>> {
        let requests = sqlx::query_as::<_, TeamRequest>(
            "SELECT id, user_id, item_id, score, created_at, updated_at
             FROM team_requests WHERE user_id = ?
             ORDER BY score DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list team requests for user")?;

        Ok(requests)
    }
}
