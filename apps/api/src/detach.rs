//! Detached execution for request-scoped side effects.
//!
//! A response returning to the client must not abort an in-flight cache
//! write, enqueue, or model call: handlers run those on a fresh task with
//! an independent bounded timeout instead of inheriting the request's
//! cancellation. Dropping the returned future abandons the wait, never
//! the work.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DetachError {
    #[error("detached operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("detached operation panicked")]
    Panicked,
}

/// Runs `fut` on its own task with `limit` as its deadline and returns a
/// future resolving to the outcome. The spawn happens immediately, so the
/// operation keeps running even if the returned future is dropped.
pub fn detached<T, F>(limit: Duration, fut: F) -> impl Future<Output = Result<T, DetachError>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(tokio::time::timeout(limit, fut));
    async move {
        match handle.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(DetachError::TimedOut(limit)),
            Err(_) => Err(DetachError::Panicked),
        }
    }
}

/// Fire-and-forget variant for side effects whose result the response does
/// not need (e.g. visit recording). Failures and timeouts are logged.
pub fn spawn_logged<E, F>(label: &'static str, limit: Duration, fut: F)
where
    E: std::fmt::Display,
    F: Future<Output = Result<(), E>> + Send + 'static,
{
    tokio::spawn(async move {
        match tokio::time::timeout(limit, fut).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task = label, error = %e, "detached task failed"),
            Err(_) => warn!(
                task = label,
                timeout_ms = limit.as_millis() as u64,
                "detached task timed out"
            ),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_work_survives_a_dropped_caller() {
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();

        let waiting = detached(Duration::from_secs(10), async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            flag.store(true, Ordering::SeqCst);
        });
        // Simulate the client disconnecting before the work finishes.
        drop(waiting);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_returns_the_value() {
        let out = detached(Duration::from_secs(5), async { 17 }).await.unwrap();
        assert_eq!(out, 17);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_times_out_independently() {
        let result: Result<(), _> = detached(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .await;
        assert!(matches!(result, Err(DetachError::TimedOut(_))));
    }
}
