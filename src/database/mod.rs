//! Transaction record persistence
//!
//! [`TransactionStore`] is the port the reconciliation engine writes through.
//! The Postgres store backs production; the in-memory store backs tests and
//! local runs without a database.

pub mod error;
pub mod memory;
pub mod repository;
pub mod transaction_record;
#[cfg(feature = "database")]
pub mod transaction_record_repository;

pub use memory::InMemoryTransactionStore;
pub use repository::TransactionStore;
pub use transaction_record::{NewTransactionRecord, StatusUpdate, SweepQuery, TransactionRecord};
#[cfg(feature = "database")]
pub use transaction_record_repository::TransactionRecordRepository;

#[cfg(feature = "database")]
pub use self::pool::{health_check, init_pool};

use std::time::Duration;

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 2,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

#[cfg(feature = "database")]
mod pool {
    use super::error::DatabaseError;
    use super::PoolConfig;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use tracing::{error, info, warn};

    /// Connect and verify that one connection can be acquired
    pub async fn init_pool(
        database_url: &str,
        config: Option<PoolConfig>,
    ) -> Result<PgPool, DatabaseError> {
        let config = config.unwrap_or_default();

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to transaction database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connection_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| {
                error!(error = %e, "Database pool initialization failed");
                DatabaseError::from_sqlx(e).with_context("connect")
            })?;

        health_check(&pool).await?;

        info!("Transaction database ready");
        Ok(pool)
    }

    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1")
            .fetch_one(pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Database health check failed");
                DatabaseError::from_sqlx(e).with_context("health check")
            })?;
        Ok(())
    }
}
