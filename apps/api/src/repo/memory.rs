//! In-memory `PromptRepo` fake for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::models::prompt::{PromptEngagement, PromptRow, PromptVersionRow};
use crate::repo::{Counter, PromptDraft, PromptRepo, RepoError};
use crate::workspace::models::PromptStatus;

#[derive(Default)]
pub struct MemoryPromptRepo {
    prompts: Mutex<HashMap<i64, PromptRow>>,
    versions: Mutex<Vec<PromptVersionRow>>,
    next_prompt_id: AtomicI64,
    next_version_id: AtomicI64,
    fail_increments: AtomicBool,
}

impl MemoryPromptRepo {
    pub fn new() -> Self {
        Self {
            next_prompt_id: AtomicI64::new(1),
            next_version_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Makes `increment_counter` fail until cleared, to exercise the
    /// leave-for-next-cycle flush path.
    pub fn fail_increments(&self, fail: bool) {
        self.fail_increments.store(fail, Ordering::SeqCst);
    }

    pub fn versions_for(&self, prompt_id: i64) -> Vec<PromptVersionRow> {
        self.versions
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.prompt_id == prompt_id)
            .cloned()
            .collect()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn row_from_draft(&self, id: i64, draft: &PromptDraft) -> PromptRow {
        let now = Utc::now();
        PromptRow {
            id,
            user_id: draft.user_id,
            topic: draft.topic.clone(),
            language: draft.language.clone(),
            model_key: draft.model_key.clone(),
            body: draft.body.clone(),
            positive_keywords: serde_json::to_value(&draft.positive_keywords).unwrap(),
            negative_keywords: serde_json::to_value(&draft.negative_keywords).unwrap(),
            tags: serde_json::to_value(&draft.tags).unwrap(),
            status: draft.status.as_str().to_string(),
            published_at: draft.publish.then(|| now),
            version: 1,
            downloads: 0,
            likes: 0,
            visits: 0,
            quality_score: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl PromptRepo for MemoryPromptRepo {
    async fn create_prompt(&self, draft: &PromptDraft) -> Result<i64, RepoError> {
        let id = self.next_prompt_id.fetch_add(1, Ordering::SeqCst);
        let row = self.row_from_draft(id, draft);
        self.prompts.lock().unwrap().insert(id, row);
        Ok(id)
    }

    async fn update_prompt(&self, id: i64, draft: &PromptDraft) -> Result<(), RepoError> {
        let mut prompts = self.prompts.lock().unwrap();
        if let Some(row) = prompts.get_mut(&id) {
            row.topic = draft.topic.clone();
            row.language = draft.language.clone();
            row.model_key = draft.model_key.clone();
            row.body = draft.body.clone();
            row.positive_keywords = serde_json::to_value(&draft.positive_keywords).unwrap();
            row.negative_keywords = serde_json::to_value(&draft.negative_keywords).unwrap();
            row.tags = serde_json::to_value(&draft.tags).unwrap();
            row.status = draft.status.as_str().to_string();
            if draft.publish && row.published_at.is_none() {
                row.published_at = Some(Utc::now());
            }
            row.version += 1;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_prompt_meta(
        &self,
        id: i64,
        status: PromptStatus,
        tags: &[String],
        publish: bool,
    ) -> Result<(), RepoError> {
        let mut prompts = self.prompts.lock().unwrap();
        if let Some(row) = prompts.get_mut(&id) {
            row.status = status.as_str().to_string();
            row.tags = serde_json::to_value(tags).unwrap();
            if publish && row.published_at.is_none() {
                row.published_at = Some(Utc::now());
            }
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn append_version(&self, prompt_id: i64, body: &str) -> Result<(), RepoError> {
        let id = self.next_version_id.fetch_add(1, Ordering::SeqCst);
        self.versions.lock().unwrap().push(PromptVersionRow {
            id,
            prompt_id,
            body: body.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn prune_versions(&self, prompt_id: i64, keep: i64) -> Result<u64, RepoError> {
        let mut versions = self.versions.lock().unwrap();
        let mut ids: Vec<i64> = versions
            .iter()
            .filter(|v| v.prompt_id == prompt_id)
            .map(|v| v.id)
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        let doomed: std::collections::HashSet<i64> =
            ids.into_iter().skip(keep.max(0) as usize).collect();
        let before = versions.len();
        versions.retain(|v| !doomed.contains(&v.id));
        Ok((before - versions.len()) as u64)
    }

    async fn list_versions(&self, prompt_id: i64) -> Result<Vec<PromptVersionRow>, RepoError> {
        let mut rows = self.versions_for(prompt_id);
        rows.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        Ok(rows)
    }

    async fn increment_counter(
        &self,
        prompt_id: i64,
        counter: Counter,
        delta: i64,
    ) -> Result<bool, RepoError> {
        if self.fail_increments.load(Ordering::SeqCst) {
            return Err(RepoError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut prompts = self.prompts.lock().unwrap();
        match prompts.get_mut(&prompt_id) {
            Some(row) => {
                let slot = match counter {
                    Counter::Downloads => &mut row.downloads,
                    Counter::Likes => &mut row.likes,
                    Counter::Visits => &mut row.visits,
                };
                *slot = slot.saturating_add(delta);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_score(&self, prompt_id: i64, score: f64) -> Result<(), RepoError> {
        let mut prompts = self.prompts.lock().unwrap();
        if let Some(row) = prompts.get_mut(&prompt_id) {
            row.quality_score = score;
        }
        Ok(())
    }

    async fn list_public_after(
        &self,
        cursor: i64,
        limit: i64,
    ) -> Result<Vec<PromptEngagement>, RepoError> {
        let prompts = self.prompts.lock().unwrap();
        let mut rows: Vec<&PromptRow> = prompts
            .values()
            .filter(|r| r.status == PromptStatus::Published.as_str() && r.id > cursor)
            .collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|row| PromptEngagement {
                id: row.id,
                downloads: row.downloads,
                likes: row.likes,
                visits: row.visits,
                updated_at: Some(row.updated_at),
            })
            .collect())
    }

    async fn fetch_prompt(&self, id: i64) -> Result<Option<PromptRow>, RepoError> {
        Ok(self.prompts.lock().unwrap().get(&id).cloned())
    }
}
