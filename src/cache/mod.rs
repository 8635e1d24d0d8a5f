//! Redis cache for per-item gateway credentials
//!
//! Credentials change rarely but are needed on every return, webhook and sweep
//! call; caching them saves a host API round trip per reconciliation.

pub mod cache;
pub mod credentials;
pub mod error;
pub mod keys;

pub use cache::{Cache, RedisCache};
pub use credentials::CachedCredentialsSource;
pub use error::CacheError;

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use std::time::Duration;
use tracing::{info, warn};

pub type RedisPool = Pool<RedisConnectionManager>;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub max_connections: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 10,
            min_idle: 1,
            connection_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Build the pool; an unreachable server is logged, not fatal
pub async fn init_cache_pool(config: CacheConfig) -> Result<RedisPool, CacheError> {
    let manager = RedisConnectionManager::new(config.redis_url.as_str())
        .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .min_idle(config.min_idle)
        .connection_timeout(config.connection_timeout)
        .idle_timeout(config.idle_timeout)
        .build(manager)
        .await
        .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

    match health_check(&pool).await {
        Ok(()) => info!(max_connections = config.max_connections, "Credential cache ready"),
        Err(e) => warn!(error = %e, "Redis not answering yet; credential lookups bypass the cache"),
    }

    Ok(pool)
}

pub async fn health_check(pool: &RedisPool) -> Result<(), CacheError> {
    let mut conn = pool.get().await?;
    let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
    Ok(())
}
