//! FIFO queue of persistence tasks.
//!
//! Exactly-once consumption from the queue's point of view: once popped, a
//! task is gone regardless of what happens downstream. Production uses a
//! Redis list (RPUSH/BLPOP); tests use the in-memory queue below.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::workspace::models::PersistTask;

const QUEUE_KEY: &str = "persist:queue";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("malformed task payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Appends to the tail and returns the task id immediately.
    async fn enqueue(&self, task: &PersistTask) -> Result<Uuid, QueueError>;

    /// Removes and returns the head, waiting up to `timeout`. `None` means
    /// the queue stayed empty for the whole wait; the worker uses that to
    /// check for shutdown between polls.
    async fn pop_blocking(&self, timeout: Duration) -> Result<Option<PersistTask>, QueueError>;
}

pub struct RedisTaskQueue {
    client: redis::Client,
}

impl RedisTaskQueue {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, task: &PersistTask) -> Result<Uuid, QueueError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(task)?;
        let _: i64 = redis::cmd("RPUSH")
            .arg(QUEUE_KEY)
            .arg(payload)
            .query_async(&mut con)
            .await?;
        Ok(task.task_id)
    }

    async fn pop_blocking(&self, timeout: Duration) -> Result<Option<PersistTask>, QueueError> {
        // BLPOP needs a connection of its own; it parks the connection for
        // the whole wait.
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(QUEUE_KEY)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut con)
            .await?;
        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub struct MemoryTaskQueue {
    queue: std::sync::Mutex<std::collections::VecDeque<PersistTask>>,
    notify: tokio::sync::Notify,
}

#[cfg(test)]
impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self {
            queue: std::sync::Mutex::new(std::collections::VecDeque::new()),
            notify: tokio::sync::Notify::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: &PersistTask) -> Result<Uuid, QueueError> {
        self.queue.lock().unwrap().push_back(task.clone());
        self.notify.notify_waiters();
        Ok(task.task_id)
    }

    async fn pop_blocking(&self, timeout: Duration) -> Result<Option<PersistTask>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(task) = self.queue.lock().unwrap().pop_front() {
                return Ok(Some(task));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(self.queue.lock().unwrap().pop_front());
            }
        }
    }
}
