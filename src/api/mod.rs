//! HTTP API

pub mod health;
pub mod payment;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::payments::signing::{RETURN_PATH, WEBHOOK_PATH};
pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/payment/create", post(payment::create_payment))
        .route(RETURN_PATH, get(payment::payment_return))
        .route(
            WEBHOOK_PATH,
            get(payment::payment_webhook).post(payment::payment_webhook),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
