//! Payment HTTP handlers

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use std::collections::HashMap;
use tracing::warn;
use url::form_urlencoded;

use crate::api::state::AppState;
use crate::payments::callbacks::{CallbackParams, WebhookReply};
use crate::payments::initiate::CreatePaymentRequest;
use crate::payments::types::WebhookRequest;

/// POST /payment/create
pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Response {
    let response = state.initiator.create_payment(request).await;
    let status = if response.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(response)).into_response()
}

/// GET /payment/return
pub async fn payment_return(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Redirect {
    let outcome = match CallbackParams::from_query(&query) {
        Ok(params) => {
            let order_id = query.get("orderId").map(String::as_str).unwrap_or_default();
            state.callbacks.handle_return(&params, order_id).await
        }
        Err(e) => {
            warn!(error = %e, "Rejected malformed return request");
            state.callbacks.rejected()
        }
    };

    Redirect::to(&outcome.redirect_url())
}

/// GET|POST /payment/webhook
///
/// The order id may arrive in the query string, a form body or a JSON body.
pub async fn payment_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let reply = match CallbackParams::from_query(&query) {
        Ok(params) => {
            let request = webhook_request(query, &body);
            state.callbacks.handle_webhook(&params, &request).await
        }
        Err(e) => {
            warn!(error = %e, "Rejected malformed webhook request");
            WebhookReply::Failed {
                message: e.to_string(),
            }
        }
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        reply.to_string(),
    )
        .into_response()
}

fn webhook_request(mut params: HashMap<String, String>, body: &[u8]) -> WebhookRequest {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();

    if text.is_empty() {
        return WebhookRequest { params, body: None };
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
        return WebhookRequest {
            params,
            body: Some(json),
        };
    }

    for (key, value) in form_urlencoded::parse(text.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    WebhookRequest { params, body: None }
}
