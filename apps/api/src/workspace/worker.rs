//! Background consumer that drains the persistence queue and performs the
//! durable create-or-update for each workspace commit.
//!
//! This is the only writer of durable prompt state originating from
//! workspace edits; tasks run strictly one at a time, so two saves of the
//! same workspace can never race at the durable layer. A failed task is
//! logged and dropped; the user's next save is the retry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::repo::{PromptDraft, PromptRepo};
use crate::workspace::models::{PersistAction, PersistTask, PromptStatus};
use crate::workspace::queue::TaskQueue;
use crate::workspace::store::{WorkspaceError, WorkspaceStore};

/// Bounded poll so the loop can notice shutdown between pops.
const POP_TIMEOUT: Duration = Duration::from_secs(2);

/// Published version-history rows kept per prompt; older rows are pruned
/// on every publish.
const VERSION_RETENTION: i64 = 20;

pub struct PersistWorker {
    queue: Arc<dyn TaskQueue>,
    workspace: WorkspaceStore,
    repo: Arc<dyn PromptRepo>,
    retention: i64,
}

impl PersistWorker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        workspace: WorkspaceStore,
        repo: Arc<dyn PromptRepo>,
    ) -> Self {
        Self {
            queue,
            workspace,
            repo,
            retention: VERSION_RETENTION,
        }
    }

    /// Runs until the shutdown signal flips. Idle -> pop -> load -> commit,
    /// then back to idle.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("persistence worker started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("persistence worker shutting down");
                    break;
                }
                popped = self.queue.pop_blocking(POP_TIMEOUT) => match popped {
                    Ok(Some(task)) => {
                        match self.process(&task).await {
                            Ok(prompt_id) => {
                                debug!(task_id = %task.task_id, prompt_id, "persist task committed");
                            }
                            Err(e) => {
                                error!(task_id = %task.task_id, error = %e, "persist task failed; dropping");
                            }
                        }
                    }
                    Ok(None) => {} // empty poll; loop to re-check shutdown
                    Err(e) => {
                        error!(error = %e, "queue pop failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }

    /// Commits one task. Returns the durable prompt id it wrote.
    pub async fn process(&self, task: &PersistTask) -> Result<i64> {
        let snapshot = match self
            .workspace
            .snapshot(task.user_id, task.workspace_token)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(WorkspaceError::NotFound) => {
                // Session expired before the commit. The task carries enough
                // for a meta-only update of an already-linked record; a
                // create has no body or topic to fall back on.
                if task.action == PersistAction::Update && task.linked_prompt_id != 0 {
                    warn!(
                        task_id = %task.task_id,
                        prompt_id = task.linked_prompt_id,
                        "workspace expired before commit; applying meta-only update"
                    );
                    self.repo
                        .update_prompt_meta(
                            task.linked_prompt_id,
                            effective_status(task),
                            &task.tags,
                            task.publish,
                        )
                        .await?;
                    return Ok(task.linked_prompt_id);
                }
                bail!("workspace snapshot expired and task has no fallback body");
            }
            Err(e) => return Err(e).context("loading workspace snapshot"),
        };

        let status = effective_status(task);
        let draft = PromptDraft {
            user_id: task.user_id,
            topic: snapshot.topic.clone(),
            language: snapshot.language.clone(),
            model_key: snapshot.model_key.clone(),
            body: snapshot.draft_body.clone(),
            positive_keywords: snapshot.positive_keywords.clone(),
            negative_keywords: snapshot.negative_keywords.clone(),
            tags: task.tags.clone(),
            status,
            publish: task.publish,
        };

        let prompt_id = if task.action == PersistAction::Create || task.linked_prompt_id == 0 {
            self.repo.create_prompt(&draft).await?
        } else {
            self.repo.update_prompt(task.linked_prompt_id, &draft).await?;
            task.linked_prompt_id
        };

        if task.publish {
            self.repo.append_version(prompt_id, &snapshot.draft_body).await?;
            let pruned = self.repo.prune_versions(prompt_id, self.retention).await?;
            if pruned > 0 {
                debug!(prompt_id, pruned, "pruned version history");
            }
        }

        // Write-back for UI consistency. The session expiring between the
        // commit and this point is normal, not a failure of the task.
        match self
            .workspace
            .set_meta(task.user_id, task.workspace_token, prompt_id, status)
            .await
        {
            Ok(()) => {}
            Err(WorkspaceError::NotFound) => {
                debug!(task_id = %task.task_id, "snapshot expired after commit; skipping write-back");
            }
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "write-back to workspace failed");
            }
        }

        Ok(prompt_id)
    }
}

fn effective_status(task: &PersistTask) -> PromptStatus {
    if task.publish {
        PromptStatus::Published
    } else {
        task.status
    }
}
