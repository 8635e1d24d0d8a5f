use thiserror::Error;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Redis pool error: {0}")]
    PoolError(String),

    #[error("Redis command failed: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Cache serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<bb8::RunError<redis::RedisError>> for CacheError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        match err {
            bb8::RunError::User(e) => CacheError::RedisError(e),
            bb8::RunError::TimedOut => {
                CacheError::PoolError("timed out waiting for a connection".to_string())
            }
        }
    }
}
