//! Durable prompt storage contract.
//!
//! The persistence worker, the visit flush and the score refresh all write
//! through this trait; handlers read through it. Production is Postgres
//! via sqlx; tests use the in-memory fake in `repo::memory`.

pub mod pg;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::prompt::{PromptEngagement, PromptRow, PromptVersionRow};
use crate::workspace::models::{KeywordItem, PromptStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Counter columns that accept buffered or direct increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Downloads,
    Likes,
    Visits,
}

impl Counter {
    pub fn name(&self) -> &'static str {
        match self {
            Counter::Downloads => "downloads",
            Counter::Likes => "likes",
            Counter::Visits => "visits",
        }
    }
}

/// Everything a durable create-or-update writes in one commit.
#[derive(Debug, Clone)]
pub struct PromptDraft {
    pub user_id: Uuid,
    pub topic: String,
    pub language: String,
    pub model_key: String,
    pub body: String,
    pub positive_keywords: Vec<KeywordItem>,
    pub negative_keywords: Vec<KeywordItem>,
    pub tags: Vec<String>,
    pub status: PromptStatus,
    pub publish: bool,
}

#[async_trait]
pub trait PromptRepo: Send + Sync {
    async fn create_prompt(&self, draft: &PromptDraft) -> Result<i64, RepoError>;

    async fn update_prompt(&self, id: i64, draft: &PromptDraft) -> Result<(), RepoError>;

    /// Meta-only update used when the workspace snapshot expired before the
    /// commit: status/tags/publish from the task, nothing else.
    async fn update_prompt_meta(
        &self,
        id: i64,
        status: PromptStatus,
        tags: &[String],
        publish: bool,
    ) -> Result<(), RepoError>;

    async fn append_version(&self, prompt_id: i64, body: &str) -> Result<(), RepoError>;

    /// Deletes version rows beyond the newest `keep`. Returns how many went.
    async fn prune_versions(&self, prompt_id: i64, keep: i64) -> Result<u64, RepoError>;

    /// Version history, newest first.
    async fn list_versions(&self, prompt_id: i64) -> Result<Vec<PromptVersionRow>, RepoError>;

    /// Adds a signed delta to a counter column. Returns false when the
    /// prompt row no longer exists (nothing to reconcile).
    async fn increment_counter(
        &self,
        prompt_id: i64,
        counter: Counter,
        delta: i64,
    ) -> Result<bool, RepoError>;

    async fn update_score(&self, prompt_id: i64, score: f64) -> Result<(), RepoError>;

    /// Id-ascending batch of published prompts with id greater than
    /// `cursor`, for the score-refresh pass.
    async fn list_public_after(
        &self,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<PromptEngagement>, RepoError>;

    async fn fetch_prompt(&self, id: i64) -> Result<Option<PromptRow>, RepoError>;
}
