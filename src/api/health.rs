use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    #[cfg(feature = "database")]
    let database = match &state.db_pool {
        Some(pool) => match crate::database::health_check(pool).await {
            Ok(()) => Some("up".to_string()),
            Err(_) => Some("down".to_string()),
        },
        None => None,
    };
    #[cfg(not(feature = "database"))]
    let database: Option<String> = None;

    let healthy = database.as_deref() != Some("down");

    // Reported only; a cache outage never fails the check
    #[cfg(feature = "cache")]
    let cache = match &state.redis_pool {
        Some(pool) => match crate::cache::health_check(pool).await {
            Ok(()) => Some("up".to_string()),
            Err(_) => Some("down".to_string()),
        },
        None => None,
    };
    #[cfg(not(feature = "cache"))]
    let cache: Option<String> = None;

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment.clone(),
        database,
        cache,
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
