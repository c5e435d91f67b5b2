//! Buffered visit counting.
//!
//! The hot path writes a +1 into one shared hash in the fast store and
//! never touches Postgres; a periodic flush cycle drains the buffered
//! deltas into the durable counters under the cross-instance lease. A
//! per-viewer guard key suppresses repeat counting inside a short window.
//!
//! Counts are deliberately approximate between flushes: the detail view
//! adds `pending_delta` to the durable counter for display.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::store::{CacheError, FastStore};
use crate::metrics::lease::Lease;
use crate::repo::{Counter, PromptRepo, RepoError};

/// One shared hash; field = prompt id, value = pending delta.
const PENDING_HASH: &str = "visits:pending";

/// Window within which repeat visits from one viewer are dropped.
const GUARD_TTL: Duration = Duration::from_secs(600);

const FLUSH_LOCK_NAME: &str = "visits:flush:lock";
const FLUSH_LOCK_TTL: Duration = Duration::from_secs(60);

/// HSCAN page size and the per-cycle cap on processed entries.
const SCAN_COUNT: usize = 64;
const FLUSH_CYCLE_CAP: usize = 1024;

/// Ceiling applied when reading or applying a buffered delta. The buffer
/// clamps rather than erroring near the integer limit.
const DELTA_CEILING: i64 = i64::MAX / 2;

fn guard_key(prompt_id: i64, viewer_id: Uuid) -> String {
    format!("visits:seen:{prompt_id}:{viewer_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    /// Counted into the buffer.
    Buffered,
    /// Same viewer inside the guard window; dropped.
    Duplicate,
    /// Buffer backend down; counted straight into the durable store.
    Fallback,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    /// Another instance held the lease; nothing was scanned.
    pub skipped: bool,
    pub applied: usize,
    /// Entries whose prompt row no longer exists; cleared without writing.
    pub orphaned: usize,
    /// Entries left for the next cycle after a durable-store failure.
    pub deferred: usize,
    /// Unparsable entries skipped (and left out of the batch).
    pub malformed: usize,
}

pub struct VisitTracker {
    store: Arc<dyn FastStore>,
    repo: Arc<dyn PromptRepo>,
    lease: Lease,
}

impl VisitTracker {
    pub fn new(store: Arc<dyn FastStore>, repo: Arc<dyn PromptRepo>) -> Self {
        let lease = Lease::new(store.clone(), FLUSH_LOCK_NAME, FLUSH_LOCK_TTL);
        Self { store, repo, lease }
    }

    /// Counts one visit. Anonymous visits (no viewer id) skip the dedup
    /// guard. Backend failure degrades to an immediate durable increment
    /// rather than losing the count.
    pub async fn record_visit(
        &self,
        prompt_id: i64,
        viewer_id: Option<Uuid>,
    ) -> Result<VisitOutcome, RepoError> {
        if let Some(viewer) = viewer_id {
            match self
                .store
                .set_if_absent_ex(&guard_key(prompt_id, viewer), "1", GUARD_TTL)
                .await
            {
                Ok(true) => {}
                Ok(false) => return Ok(VisitOutcome::Duplicate),
                Err(e) => {
                    warn!(prompt_id, error = %e, "visit guard unavailable; falling back to durable increment");
                    return self.durable_fallback(prompt_id).await;
                }
            }
        }

        match self
            .store
            .hash_incr(PENDING_HASH, &prompt_id.to_string(), 1)
            .await
        {
            Ok(_) => Ok(VisitOutcome::Buffered),
            Err(e) => {
                warn!(prompt_id, error = %e, "visit buffer unavailable; falling back to durable increment");
                self.durable_fallback(prompt_id).await
            }
        }
    }

    async fn durable_fallback(&self, prompt_id: i64) -> Result<VisitOutcome, RepoError> {
        self.repo
            .increment_counter(prompt_id, Counter::Visits, 1)
            .await?;
        Ok(VisitOutcome::Fallback)
    }

    /// Non-authoritative read of the buffered-but-not-yet-flushed delta.
    /// Degrades to 0 when the buffer cannot be read.
    pub async fn pending_delta(&self, prompt_id: i64) -> i64 {
        match self
            .store
            .hash_get(PENDING_HASH, &prompt_id.to_string())
            .await
        {
            Ok(Some(raw)) => raw.parse::<i64>().unwrap_or(0).clamp(0, DELTA_CEILING),
            Ok(None) => 0,
            Err(e) => {
                debug!(prompt_id, error = %e, "pending delta read failed; reporting 0");
                0
            }
        }
    }

    /// One flush pass. At most one instance runs it per interval: the
    /// lease decides, and losing it is a normal skip.
    pub async fn flush_cycle(&self) -> Result<FlushStats, CacheError> {
        let owner = Uuid::new_v4().to_string();
        if !self.lease.acquire(&owner).await? {
            debug!("flush lease held elsewhere; skipping cycle");
            return Ok(FlushStats {
                skipped: true,
                ..FlushStats::default()
            });
        }

        let drained = self.drain().await;

        // Conditional release: if the cycle outlived the lease TTL, the
        // lock may belong to someone else now and must be left alone.
        match self.lease.release(&owner).await {
            Ok(true) => {}
            Ok(false) => warn!("flush lease expired mid-cycle; not released by us"),
            Err(e) => warn!(error = %e, "flush lease release failed"),
        }

        drained
    }

    async fn drain(&self) -> Result<FlushStats, CacheError> {
        let mut stats = FlushStats::default();
        let mut cursor = 0u64;

        loop {
            let (next, page) = self.store.hash_scan(PENDING_HASH, cursor, SCAN_COUNT).await?;

            for (field, value) in page {
                if stats.applied + stats.orphaned + stats.deferred >= FLUSH_CYCLE_CAP {
                    debug!(cap = FLUSH_CYCLE_CAP, "flush cycle cap reached; rest waits for next cycle");
                    return Ok(stats);
                }

                let Ok(prompt_id) = field.parse::<i64>() else {
                    warn!(field = %field, "malformed visit buffer field; skipping entry");
                    stats.malformed += 1;
                    continue;
                };
                let Ok(delta) = value.parse::<i64>() else {
                    warn!(field = %field, value = %value, "malformed visit buffer value; skipping entry");
                    stats.malformed += 1;
                    continue;
                };

                if delta <= 0 {
                    // Nothing pending; clear the dead field.
                    self.store.hash_delete(PENDING_HASH, &field).await?;
                    continue;
                }
                let delta = delta.min(DELTA_CEILING);

                match self
                    .repo
                    .increment_counter(prompt_id, Counter::Visits, delta)
                    .await
                {
                    Ok(true) => {
                        self.store.hash_delete(PENDING_HASH, &field).await?;
                        stats.applied += 1;
                    }
                    Ok(false) => {
                        // Prompt is gone; nothing to reconcile.
                        self.store.hash_delete(PENDING_HASH, &field).await?;
                        stats.orphaned += 1;
                    }
                    Err(e) => {
                        warn!(
                            prompt_id,
                            counter = Counter::Visits.name(),
                            error = %e,
                            "durable increment failed; leaving entry for next cycle"
                        );
                        stats.deferred += 1;
                    }
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(stats)
    }

    /// Periodic flush loop; exits when the shutdown signal flips.
    pub async fn run_flush_loop(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "visit flush worker started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    match self.flush_cycle().await {
                        Ok(stats) if !stats.skipped => {
                            debug!(
                                applied = stats.applied,
                                orphaned = stats.orphaned,
                                deferred = stats.deferred,
                                malformed = stats.malformed,
                                "flush cycle finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "flush cycle failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("visit flush worker shutting down");
                    break;
                }
            }
        }
    }
}
