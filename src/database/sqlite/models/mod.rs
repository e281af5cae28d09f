#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LikeEvent {
    pub id: Uuid,
    pub author_id: Uuid,
    pub item_id: Uuid,
    pub is_positive: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLikeEvent {
    pub author_id: Uuid,
    pub item_id: Uuid,
    pub is_positive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FeedEntry {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub score: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFeedEntry {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TeamRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub score: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTeamRequest {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub score: f64,
}

impl LikeEvent {
    /// Sign applied to neighbor similarities derived from this event.
    #[inline]
    pub fn sign(&self) -> f32 {
        if self.is_positive { 1.0 } else { -1.0 }
    }
}
