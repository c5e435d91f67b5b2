//! Periodic full-table score recompute.
//!
//! Walks published prompts in primary-key order, batch by batch, and
//! persists a fresh quality score for each from durable counters only.
//! Runs once at startup, then on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};

use crate::metrics::scoring::{compute_quality_score, ScoreWeights};
use crate::repo::{PromptRepo, RepoError};

const REFRESH_BATCH: i64 = 200;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    pub batches: usize,
    pub updated: usize,
}

pub struct ScoreRefresher {
    repo: Arc<dyn PromptRepo>,
    weights: ScoreWeights,
    batch_size: i64,
}

impl ScoreRefresher {
    pub fn new(repo: Arc<dyn PromptRepo>, weights: ScoreWeights) -> Self {
        Self {
            repo,
            weights,
            batch_size: REFRESH_BATCH,
        }
    }

    /// One full pass. The cursor is the last seen id; a short batch ends
    /// the pass.
    pub async fn run_pass(&self) -> Result<RefreshStats, RepoError> {
        let mut stats = RefreshStats::default();
        let mut cursor = 0i64;

        loop {
            let batch = self.repo.list_public_after(cursor, self.batch_size).await?;
            if batch.is_empty() {
                break;
            }
            stats.batches += 1;

            for engagement in &batch {
                let score = compute_quality_score(engagement, Utc::now(), &self.weights);
                self.repo.update_score(engagement.id, score).await?;
                stats.updated += 1;
            }

            cursor = batch.last().map(|e| e.id).unwrap_or(cursor);
            if (batch.len() as i64) < self.batch_size {
                break;
            }
        }

        Ok(stats)
    }

    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "score refresh worker started");

        match self.run_pass().await {
            Ok(stats) => info!(updated = stats.updated, "startup score refresh finished"),
            Err(e) => error!(error = %e, "startup score refresh failed"),
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.run_pass().await {
                        Ok(stats) => info!(
                            batches = stats.batches,
                            updated = stats.updated,
                            "score refresh pass finished"
                        ),
                        Err(e) => error!(error = %e, "score refresh pass failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("score refresh worker shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::memory::MemoryPromptRepo;
    use crate::repo::{Counter, PromptDraft};
    use crate::workspace::models::PromptStatus;
    use uuid::Uuid;

    async fn seed(repo: &MemoryPromptRepo, publish: bool) -> i64 {
        repo.create_prompt(&PromptDraft {
            user_id: Uuid::new_v4(),
            topic: "t".into(),
            language: "en".into(),
            model_key: "standard".into(),
            body: "b".into(),
            positive_keywords: vec![],
            negative_keywords: vec![],
            tags: vec![],
            status: if publish {
                PromptStatus::Published
            } else {
                PromptStatus::Draft
            },
            publish,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_five_entities_batch_of_two_runs_three_batches() {
        let repo = Arc::new(MemoryPromptRepo::new());
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(seed(&repo, true).await);
        }

        let mut refresher = ScoreRefresher::new(repo.clone(), ScoreWeights::default());
        refresher.batch_size = 2;

        let stats = refresher.run_pass().await.unwrap();
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.updated, 5);

        for id in ids {
            let row = repo.fetch_prompt(id).await.unwrap().unwrap();
            assert!(row.quality_score > 0.0);
        }
    }

    #[tokio::test]
    async fn test_unpublished_prompts_are_not_scored() {
        let repo = Arc::new(MemoryPromptRepo::new());
        let draft = seed(&repo, false).await;
        let public = seed(&repo, true).await;

        let refresher = ScoreRefresher::new(repo.clone(), ScoreWeights::default());
        let stats = refresher.run_pass().await.unwrap();
        assert_eq!(stats.updated, 1);

        assert_eq!(repo.fetch_prompt(draft).await.unwrap().unwrap().quality_score, 0.0);
        assert!(repo.fetch_prompt(public).await.unwrap().unwrap().quality_score > 0.0);
    }

    #[tokio::test]
    async fn test_higher_engagement_scores_higher() {
        let repo = Arc::new(MemoryPromptRepo::new());
        let quiet = seed(&repo, true).await;
        let busy = seed(&repo, true).await;
        repo.increment_counter(busy, Counter::Likes, 50).await.unwrap();
        repo.increment_counter(busy, Counter::Downloads, 20).await.unwrap();

        let refresher = ScoreRefresher::new(repo.clone(), ScoreWeights::default());
        refresher.run_pass().await.unwrap();

        let quiet_score = repo.fetch_prompt(quiet).await.unwrap().unwrap().quality_score;
        let busy_score = repo.fetch_prompt(busy).await.unwrap().unwrap().quality_score;
        assert!(busy_score > quiet_score);
    }

    #[tokio::test]
    async fn test_empty_table_is_one_empty_pass() {
        let repo = Arc::new(MemoryPromptRepo::new());
        let refresher = ScoreRefresher::new(repo, ScoreWeights::default());
        let stats = refresher.run_pass().await.unwrap();
        assert_eq!(stats, RefreshStats::default());
    }
}
