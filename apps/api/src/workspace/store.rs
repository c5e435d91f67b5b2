//! Ephemeral workspace store: TTL-bound snapshots in the fast store,
//! addressed by `ws:{user_id}:{token}`. Every mutating operation rewrites
//! the JSON value, which also refreshes the TTL.
//!
//! A dead (expired or never-created) owner+token pair surfaces as
//! `NotFound` on every operation. Callers treat that as "edit session
//! lost", not a hard error: once `linked_prompt_id` is set the durable
//! record is the source of truth and the UI can restart from it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::cache::store::{CacheError, FastStore};
use crate::workspace::models::{KeywordItem, PromptStatus, WorkspaceSnapshot};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace not found")]
    NotFound,

    #[error("cache error: {0}")]
    Store(#[from] CacheError),

    #[error("corrupt workspace entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct WorkspaceStore {
    store: Arc<dyn FastStore>,
    ttl: Duration,
}

fn entry_key(user_id: Uuid, token: Uuid) -> String {
    format!("ws:{user_id}:{token}")
}

impl WorkspaceStore {
    pub fn new(store: Arc<dyn FastStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    async fn load(&self, user_id: Uuid, token: Uuid) -> Result<WorkspaceSnapshot, WorkspaceError> {
        match self.store.get_string(&entry_key(user_id, token)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(WorkspaceError::NotFound),
        }
    }

    async fn save(
        &self,
        user_id: Uuid,
        snapshot: &WorkspaceSnapshot,
    ) -> Result<(), WorkspaceError> {
        let raw = serde_json::to_string(snapshot)?;
        self.store
            .set_string_ex(&entry_key(user_id, snapshot.token), &raw, self.ttl)
            .await?;
        Ok(())
    }

    /// Stores a fresh snapshot and returns its token. Passing an explicit
    /// token replaces that session in place (interpretation restart).
    pub async fn create_or_replace(
        &self,
        user_id: Uuid,
        token: Option<Uuid>,
        mut snapshot: WorkspaceSnapshot,
    ) -> Result<Uuid, WorkspaceError> {
        let token = token.unwrap_or_else(Uuid::new_v4);
        snapshot.token = token;
        self.save(user_id, &snapshot).await?;
        Ok(token)
    }

    /// Union-merges keyword items into the snapshot and returns the updated
    /// state. A merge where every item is already present still refreshes
    /// the TTL but does not bump the version.
    pub async fn merge_keywords(
        &self,
        user_id: Uuid,
        token: Uuid,
        items: &[KeywordItem],
    ) -> Result<WorkspaceSnapshot, WorkspaceError> {
        let mut snapshot = self.load(user_id, token).await?;
        snapshot.merge_keywords(items);
        self.save(user_id, &snapshot).await?;
        Ok(snapshot)
    }

    /// Full replacement of the draft body.
    pub async fn update_draft_body(
        &self,
        user_id: Uuid,
        token: Uuid,
        body: String,
    ) -> Result<WorkspaceSnapshot, WorkspaceError> {
        let mut snapshot = self.load(user_id, token).await?;
        snapshot.draft_body = body;
        self.save(user_id, &snapshot).await?;
        Ok(snapshot)
    }

    /// Refreshes the TTL without touching content. Used after read-only
    /// operations to keep an active edit session alive.
    pub async fn touch(&self, user_id: Uuid, token: Uuid) -> Result<(), WorkspaceError> {
        if self.store.expire(&entry_key(user_id, token), self.ttl).await? {
            Ok(())
        } else {
            Err(WorkspaceError::NotFound)
        }
    }

    pub async fn snapshot(
        &self,
        user_id: Uuid,
        token: Uuid,
    ) -> Result<WorkspaceSnapshot, WorkspaceError> {
        self.load(user_id, token).await
    }

    /// Write-back after a durable commit: links the durable record id and
    /// the committed status into the still-live session.
    pub async fn set_meta(
        &self,
        user_id: Uuid,
        token: Uuid,
        linked_prompt_id: i64,
        status: PromptStatus,
    ) -> Result<(), WorkspaceError> {
        let mut snapshot = self.load(user_id, token).await?;
        snapshot.linked_prompt_id = linked_prompt_id;
        snapshot.status = status;
        self.save(user_id, &snapshot).await
    }

    pub async fn delete(&self, user_id: Uuid, token: Uuid) -> Result<(), WorkspaceError> {
        // Load first so deleting a dead session reports NotFound.
        self.load(user_id, token).await?;
        self.store.delete(&entry_key(user_id, token)).await?;
        Ok(())
    }
}
