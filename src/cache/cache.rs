//! Cache trait and its Redis implementation
//!
//! Values are stored as JSON. When no pooled connection can be obtained the
//! cache behaves as empty, so a Redis outage never blocks a payment callback.

use super::{error::CacheResult, RedisPool};
use async_trait::async_trait;
use bb8::PooledConnection;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

type RedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

#[async_trait]
pub trait Cache<T: Serialize + DeserializeOwned + Send + Sync + 'static>: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<T>>;

    /// Store a value; `None` keeps it until evicted
    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()>;

    /// Returns whether a value was removed
    async fn delete(&self, key: &str) -> CacheResult<bool>;
}

#[derive(Clone)]
pub struct RedisCache {
    pool: RedisPool,
}

impl RedisCache {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// A pooled connection, or `None` while Redis is unreachable
    async fn connection(&self) -> Option<RedisConnection<'_>> {
        match self.pool.get().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!(error = %e, "Redis connection unavailable; bypassing cache");
                None
            }
        }
    }
}

#[async_trait]
impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Cache<T> for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(mut conn) = self.connection().await else {
            return Ok(None);
        };

        let raw: Option<String> = conn.get(key).await?;
        let Some(raw) = raw else {
            debug!(key, "Cache miss");
            return Ok(None);
        };

        // An entry written by an older schema is treated as absent
        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(key, "Cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        let Some(mut conn) = self.connection().await else {
            return Ok(());
        };

        let raw = serde_json::to_string(value)?;
        match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, raw, ttl.as_secs()).await?,
            None => conn.set::<_, _, ()>(key, raw).await?,
        }

        debug!(key, ttl_secs = ttl.map(|t| t.as_secs()), "Cache entry stored");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let Some(mut conn) = self.connection().await else {
            return Ok(false);
        };

        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }
}
