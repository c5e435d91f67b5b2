//! The fast-store capability trait and its Redis implementation.
//!
//! The trait is the narrow contract the core subsystems need from an
//! ephemeral store: TTL'd strings, atomic hash counters, set-if-absent
//! and compare-and-delete. Production runs on Redis; tests run on the
//! in-memory fake in `cache::memory`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("invalid cache value: {0}")]
    Invalid(String),
}

/// Narrow fast-store contract consumed by the workspace store, the visit
/// buffer and the flush lease.
///
/// `hash_scan` is a bounded incremental scan: pass cursor `0` to start,
/// feed the returned cursor back in, and a returned cursor of `0` means
/// the pass completed. Fields may be revisited within one pass; callers
/// must tolerate that.
#[async_trait]
pub trait FastStore: Send + Sync {
    async fn get_string(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_string_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Refreshes the TTL of an existing key. Returns false if the key is gone.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Atomically adds `delta` to an integer hash field, returning the new value.
    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, CacheError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError>;

    async fn hash_scan(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<(String, String)>), CacheError>;

    /// SET NX EX. Returns true if this call created the key.
    async fn set_if_absent_ex(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Deletes the key only if it still holds `expected`. Returns true if deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, CacheError>;
}

/// Atomic compare-and-delete. GET/DEL as two round trips would let one
/// instance delete a lease another instance re-acquired in between.
const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Production `FastStore` backed by Redis.
pub struct RedisStore {
    client: redis::Client,
    release_script: Script,
}

impl RedisStore {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            release_script: Script::new(COMPARE_AND_DELETE),
        }
    }

    async fn conn(&self) -> Result<MultiplexedConnection, CacheError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl FastStore for RedisStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut con = self.conn().await?;
        Ok(con.get(key).await?)
    }

    async fn set_string_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut con = self.conn().await?;
        let _: () = con.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut con = self.conn().await?;
        let _: i64 = con.del(key).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut con = self.conn().await?;
        Ok(con.expire(key, ttl.as_secs().max(1) as i64).await?)
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, CacheError> {
        let mut con = self.conn().await?;
        Ok(con.hincr(key, field, delta).await?)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        let mut con = self.conn().await?;
        Ok(con.hget(key, field).await?)
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError> {
        let mut con = self.conn().await?;
        let _: i64 = con.hdel(key, field).await?;
        Ok(())
    }

    async fn hash_scan(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<(String, String)>), CacheError> {
        let mut con = self.conn().await?;
        let (next, flat): (u64, Vec<String>) = redis::cmd("HSCAN")
            .arg(key)
            .arg(cursor)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut con)
            .await?;
        if flat.len() % 2 != 0 {
            return Err(CacheError::Invalid(
                "HSCAN returned an odd number of items".to_string(),
            ));
        }
        let mut pairs = Vec::with_capacity(flat.len() / 2);
        let mut it = flat.into_iter();
        while let (Some(field), Some(value)) = (it.next(), it.next()) {
            pairs.push((field, value));
        }
        Ok((next, pairs))
    }

    async fn set_if_absent_ex(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut con = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut con)
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let mut con = self.conn().await?;
        let deleted: i64 = self
            .release_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut con)
            .await?;
        Ok(deleted == 1)
    }
}
