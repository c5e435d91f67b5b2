use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Durable prompt record. Keyword lists and tags are stored as JSON blobs;
/// the workspace layer owns their structure.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromptRow {
    pub id: i64,
    pub user_id: Uuid,
    pub topic: String,
    pub language: String,
    pub model_key: String,
    pub body: String,
    pub positive_keywords: Value,
    pub negative_keywords: Value,
    pub tags: Value,
    pub status: String,
    pub published_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub downloads: i64,
    pub likes: i64,
    pub visits: i64,
    pub quality_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromptVersionRow {
    pub id: i64,
    pub prompt_id: i64,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// The engagement slice the scorer reads: counters plus the last-update
/// timestamp that feeds the recency term.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromptEngagement {
    pub id: i64,
    pub downloads: i64,
    pub likes: i64,
    pub visits: i64,
    pub updated_at: Option<DateTime<Utc>>,
}
