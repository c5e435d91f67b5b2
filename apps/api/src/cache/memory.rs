//! In-memory `FastStore` fake for unit tests.
//!
//! TTLs are tracked against the tokio clock, so tests running under
//! `#[tokio::test(start_paused = true)]` can advance time past an expiry
//! with `tokio::time::advance`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::store::{CacheError, FastStore};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, Entry>,
    hashes: HashMap<String, BTreeMap<String, String>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    poisoned: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail, to exercise degraded-backend paths.
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    /// Writes a raw hash field, bypassing `hash_incr`. Lets tests plant
    /// malformed buffer entries.
    pub fn put_hash_field(&self, key: &str, field: &str, value: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    pub fn hash_len(&self, key: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.hashes.get(key).map_or(0, |h| h.len())
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.poisoned.load(Ordering::SeqCst) {
            Err(CacheError::Invalid("memory store poisoned".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FastStore for MemoryStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        match inner.strings.get(key) {
            Some(entry) if entry.live() => Ok(Some(entry.value.clone())),
            Some(_) => {
                inner.strings.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_string_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        inner.strings.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        inner.strings.remove(key);
        inner.hashes.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        match inner.strings.get_mut(key) {
            Some(entry) if entry.live() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, CacheError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let slot = inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_insert_with(|| "0".to_string());
        let current: i64 = slot
            .parse()
            .map_err(|_| CacheError::Invalid(format!("hash field {field} is not an integer")))?;
        let next = current.saturating_add(delta);
        *slot = next.to_string();
        Ok(next)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(hash) = inner.hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn hash_scan(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<(String, String)>), CacheError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let Some(hash) = inner.hashes.get(key) else {
            return Ok((0, Vec::new()));
        };
        let page: Vec<(String, String)> = hash
            .iter()
            .skip(cursor as usize)
            .take(count)
            .map(|(f, v)| (f.clone(), v.clone()))
            .collect();
        let consumed = cursor as usize + page.len();
        let next = if consumed < hash.len() { consumed as u64 } else { 0 };
        Ok((next, page))
    }

    async fn set_if_absent_ex(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if inner.strings.get(key).is_some_and(Entry::live) {
            return Ok(false);
        }
        inner.strings.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        match inner.strings.get(key) {
            Some(entry) if entry.live() && entry.value == expected => {
                inner.strings.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_string_ttl_expires() {
        let store = MemoryStore::new();
        store
            .set_string_ex("k", "v", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.get_string("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get_string("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_refreshes_and_reports_missing() {
        let store = MemoryStore::new();
        store
            .set_string_ex("k", "v", Duration::from_secs(5))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.expire("k", Duration::from_secs(10)).await.unwrap());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get_string("k").await.unwrap().as_deref(), Some("v"));
        assert!(!store.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_incr_and_scan_pages() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.hash_incr("h", &format!("f{i}"), i + 1).await.unwrap();
        }

        let (next, page) = store.hash_scan("h", 0, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_ne!(next, 0);

        let (next, page2) = store.hash_scan("h", next, 2).await.unwrap();
        assert_eq!(page2.len(), 2);
        let (next, page3) = store.hash_scan("h", next, 2).await.unwrap();
        assert_eq!(page3.len(), 1);
        assert_eq!(next, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent_respects_ttl() {
        let store = MemoryStore::new();
        assert!(store
            .set_if_absent_ex("lock", "a", Duration::from_secs(30))
            .await
            .unwrap());
        assert!(!store
            .set_if_absent_ex("lock", "b", Duration::from_secs(30))
            .await
            .unwrap());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(store
            .set_if_absent_ex("lock", "b", Duration::from_secs(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete_owner_only() {
        let store = MemoryStore::new();
        store
            .set_string_ex("lock", "owner-a", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(!store.compare_and_delete("lock", "owner-b").await.unwrap());
        assert!(store.compare_and_delete("lock", "owner-a").await.unwrap());
        assert!(!store.compare_and_delete("lock", "owner-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_incr_saturates_instead_of_overflowing() {
        let store = MemoryStore::new();
        store.put_hash_field("h", "big", &i64::MAX.to_string());
        let v = store.hash_incr("h", "big", 1).await.unwrap();
        assert_eq!(v, i64::MAX);
    }
}
