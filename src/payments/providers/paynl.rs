//! PAY. payment processor implementation
//!
//! Talks to the PAY. order API (`/v1/orders`). Each call authenticates with the
//! merchant account's token code and API token, so one client instance serves
//! every account.

use crate::error::{PaymentError, PaymentResult};
use crate::payments::scope;
use crate::payments::traits::RemoteGateway;
use crate::payments::types::{
    CreateTransactionRequest, CreatedTransaction, GatewayCredentials, RemoteObservation,
};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

const PROVIDER: &str = "PAY.";

/// PAY. client configuration
#[derive(Debug, Clone)]
pub struct PaynlConfig {
    /// PAY. API base URL (defaults to https://connect.pay.nl)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for PaynlConfig {
    fn default() -> Self {
        Self {
            base_url: "https://connect.pay.nl".to_string(),
            timeout_secs: 10,
        }
    }
}

impl PaynlConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let base_url = std::env::var("PAYNL_API_URL")
            .unwrap_or_else(|_| "https://connect.pay.nl".to_string());

        let timeout_secs = std::env::var("PAYNL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Self {
            base_url,
            timeout_secs,
        }
    }
}

/// PAY. order API client
///
/// Requests are never retried here: the processor retries its own exchange
/// calls and the sweep worker picks up anything left open.
pub struct PaynlProvider {
    config: PaynlConfig,
    client: Client,
}

impl PaynlProvider {
    pub fn new(config: PaynlConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// Make an authenticated request to the PAY. API
    async fn make_request<T>(
        &self,
        credentials: &GatewayCredentials,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> PaymentResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut request = self
            .client
            .request(method, self.url(endpoint))
            .basic_auth(&credentials.token_code, Some(&credentials.api_token))
            .header("Accept", "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            error!(endpoint, error = %e, "PAY. request failed");
            PaymentError::remote_unavailable(format!("{} request failed: {}", PROVIDER, e))
        })?;

        let status = response.status();
        let response_text = response.text().await.unwrap_or_default();

        if status.is_success() {
            return serde_json::from_str::<T>(&response_text).map_err(|e| {
                error!(endpoint, error = %e, "Failed to parse PAY. response");
                PaymentError::gateway(format!("Invalid response format: {}", e))
            });
        }

        let message = serde_json::from_str::<PaynlErrorResponse>(&response_text)
            .ok()
            .and_then(PaynlErrorResponse::into_message)
            .unwrap_or_else(|| format!("HTTP {}: {}", status, response_text));

        error!(endpoint, status = %status, message = %message, "PAY. API error");

        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(PaymentError::remote_unavailable(message))
        } else {
            Err(PaymentError::gateway(message))
        }
    }
}

/// Amount in minor units, as the order API expects
fn to_cents(amount: Decimal) -> PaymentResult<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| PaymentError::invalid_argument(format!("amount {} out of range", amount)))
}

/// Order ids are spliced into request paths, so only `[A-Za-z0-9_-]` passes
fn is_order_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn order_payload(
    credentials: &GatewayCredentials,
    request: &CreateTransactionRequest,
) -> PaymentResult<serde_json::Value> {
    let mut payload = serde_json::json!({
        "serviceId": credentials.service_id,
        "description": request.description,
        "amount": {
            "value": to_cents(request.amount)?,
            "currency": request.currency,
        },
        "returnUrl": request.urls.return_url,
        "exchangeUrl": request.urls.exchange_url,
        "integration": { "test": request.test_mode },
        "stats": { "extra1": scope::encode(&request.scope) },
    });

    if let Some(method_id) = request.payment_method_id {
        let mut method = serde_json::json!({ "id": method_id });
        if let Some(bank_id) = request.bank_id {
            method["input"] = serde_json::json!({ "issuerId": bank_id.to_string() });
        }
        payload["paymentMethod"] = method;
    }

    Ok(payload)
}

#[async_trait]
impl RemoteGateway for PaynlProvider {
    async fn create_transaction(
        &self,
        credentials: &GatewayCredentials,
        request: CreateTransactionRequest,
    ) -> PaymentResult<CreatedTransaction> {
        info!(
            amount = %request.amount,
            currency = %request.currency,
            component = %request.scope.component,
            item_id = request.scope.item_id,
            "Creating PAY. order"
        );

        let payload = order_payload(credentials, &request)?;
        let response: PaynlOrderResponse = self
            .make_request(credentials, reqwest::Method::POST, "/v1/orders", Some(&payload))
            .await?;

        info!(order_id = %response.order_id, "PAY. order created");

        Ok(CreatedTransaction {
            transaction_id: response.order_id,
            payment_reference: response.reference.unwrap_or(response.id),
            redirect_url: response.links.redirect,
        })
    }

    async fn get_status(
        &self,
        credentials: &GatewayCredentials,
        transaction_id: &str,
    ) -> PaymentResult<RemoteObservation> {
        if !is_order_id(transaction_id) {
            return Err(PaymentError::invalid_argument(format!(
                "malformed transaction id {:?}",
                transaction_id
            )));
        }

        let response: PaynlOrderResponse = self
            .make_request(
                credentials,
                reqwest::Method::GET,
                &format!("/v1/orders/{}/status", transaction_id),
                None,
            )
            .await?;

        Ok(response.into_observation())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaynlOrderResponse {
    id: String,
    order_id: String,
    #[serde(default)]
    reference: Option<String>,
    status: PaynlStatus,
    #[serde(default)]
    stats: PaynlStats,
    #[serde(default)]
    links: PaynlLinks,
}

impl PaynlOrderResponse {
    fn into_observation(self) -> RemoteObservation {
        RemoteObservation {
            order_id: self.order_id,
            status_code: self.status.code,
            status_name: self.status.action,
            metadata: self.stats.extra1.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaynlStatus {
    code: i32,
    action: String,
}

#[derive(Debug, Default, Deserialize)]
struct PaynlStats {
    #[serde(default)]
    extra1: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PaynlLinks {
    #[serde(default)]
    redirect: String,
}

#[derive(Debug, Deserialize)]
struct PaynlErrorResponse {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl PaynlErrorResponse {
    fn into_message(self) -> Option<String> {
        self.detail.or(self.title)
    }
}
