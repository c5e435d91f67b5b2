//! Advisory single-owner lease on top of the fast store.
//!
//! Acquire is set-if-absent-with-TTL; release is compare-and-delete with
//! the owner token, so a slow holder cannot release a lease a different
//! instance has since acquired. The lease self-expires if never released.
//!
//! The primitive is best-effort, not consensus: everything it guards is
//! additive and idempotent by resubmission, so a rare double-grant is
//! degraded, not corrupt.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::store::{CacheError, FastStore};

pub struct Lease {
    store: Arc<dyn FastStore>,
    name: String,
    ttl: Duration,
}

impl Lease {
    pub fn new(store: Arc<dyn FastStore>, name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            name: name.into(),
            ttl,
        }
    }

    /// Returns true if this call took the lease. False means another owner
    /// holds it; that is a normal skip signal, not an error.
    pub async fn acquire(&self, owner: &str) -> Result<bool, CacheError> {
        self.store.set_if_absent_ex(&self.name, owner, self.ttl).await
    }

    /// Releases only if `owner` still holds the lease. Returns true if the
    /// lease was actually released by this call.
    pub async fn release(&self, owner: &str) -> Result<bool, CacheError> {
        self.store.compare_and_delete(&self.name, owner).await
    }
}
