//! Application state

use std::sync::Arc;

use crate::payments::{CallbackService, PaymentInitiator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub initiator: Arc<PaymentInitiator>,
    pub callbacks: Arc<CallbackService>,
    pub environment: String,

    /// Database pool (None when running on the in-memory store)
    #[cfg(feature = "database")]
    pub db_pool: Option<sqlx::PgPool>,

    /// Redis pool (None when credential caching is disabled)
    #[cfg(feature = "cache")]
    pub redis_pool: Option<crate::cache::RedisPool>,
}
