//! Edit-session state and the persistence-task message.
//!
//! A `WorkspaceSnapshot` lives only in the fast store, addressed by
//! (owner, token), and expires by TTL if abandoned. Keyword merging is a
//! pure operation on the snapshot so both the store and its tests share
//! one definition of the dedup invariant.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordSource {
    Model,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordItem {
    pub word: String,
    pub source: KeywordSource,
    pub polarity: Polarity,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStatus {
    Draft,
    Published,
    Archived,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptStatus::Draft => "draft",
            PromptStatus::Published => "published",
            PromptStatus::Archived => "archived",
        }
    }
}

/// In-progress edit session for one prompt.
///
/// `linked_prompt_id` stays 0 until the first durable commit; after that it
/// is the durable source of truth if the session expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub token: Uuid,
    pub topic: String,
    pub language: String,
    pub model_key: String,
    pub draft_body: String,
    pub positive_keywords: Vec<KeywordItem>,
    pub negative_keywords: Vec<KeywordItem>,
    pub linked_prompt_id: i64,
    pub status: PromptStatus,
    pub version: i64,
}

impl WorkspaceSnapshot {
    pub fn new(topic: String, language: String, model_key: String) -> Self {
        Self {
            token: Uuid::nil(),
            topic,
            language,
            model_key,
            draft_body: String::new(),
            positive_keywords: Vec::new(),
            negative_keywords: Vec::new(),
            linked_prompt_id: 0,
            status: PromptStatus::Draft,
            version: 1,
        }
    }

    /// Appends items whose (polarity, lowercased word) is not already held.
    /// Bumps `version` only when something was actually added. Returns the
    /// number of items appended; 0 is a no-op, not an error.
    pub fn merge_keywords(&mut self, items: &[KeywordItem]) -> usize {
        let mut added = 0;
        for item in items {
            let word = item.word.trim();
            if word.is_empty() {
                continue;
            }
            let lowered = word.to_lowercase();
            let list = match item.polarity {
                Polarity::Positive => &mut self.positive_keywords,
                Polarity::Negative => &mut self.negative_keywords,
            };
            if list.iter().any(|k| k.word.to_lowercase() == lowered) {
                continue;
            }
            list.push(KeywordItem {
                word: word.to_string(),
                ..item.clone()
            });
            added += 1;
        }
        if added > 0 {
            self.version += 1;
        }
        added
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistAction {
    Create,
    Update,
}

/// One "commit this workspace" message. Consumed exactly once from the
/// queue; a failed task is logged and dropped, the next save is the retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistTask {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub workspace_token: Uuid,
    pub linked_prompt_id: i64,
    pub action: PersistAction,
    pub status: PromptStatus,
    pub tags: Vec<String>,
    pub publish: bool,
}
