//! HTTP client for the host platform API

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{PaymentError, PaymentResult};
use crate::payments::traits::{CredentialsSource, DeliveryHook, PayableSource};
use crate::payments::types::{GatewayCredentials, ItemRef, Payable, PaymentRecordRequest, Scope};

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub base_url: String,
    /// Bearer token for the host API (secret)
    pub api_token: String,
    pub gateway_name: String,
    pub timeout_secs: u64,
}

pub struct HostClient {
    config: HostConfig,
    client: Client,
}

impl HostClient {
    pub fn new(config: HostConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn item_url(&self, path: &str, item: &ItemRef) -> PaymentResult<Url> {
        let item_id = item.item_id.to_string();
        Url::parse_with_params(
            &format!("{}{}", self.config.base_url.trim_end_matches('/'), path),
            &[
                ("component", item.component.as_str()),
                ("paymentarea", item.payment_area.as_str()),
                ("itemid", item_id.as_str()),
                ("gateway", self.config.gateway_name.as_str()),
            ],
        )
        .map_err(|e| PaymentError::invalid_argument(format!("invalid host URL: {}", e)))
    }

    fn url(&self, path: &str) -> PaymentResult<Url> {
        Url::parse(&format!("{}{}", self.config.base_url.trim_end_matches('/'), path))
            .map_err(|e| PaymentError::invalid_argument(format!("invalid host URL: {}", e)))
    }

    async fn send_raw<B>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> PaymentResult<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let path = url.path().to_string();
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.config.api_token)
            .header("Accept", "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            error!(path = %path, error = %e, "Host request failed");
            PaymentError::host_unavailable(e.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PaymentError::invalid_argument(format!(
                "host has no resource at {}",
                path
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(path = %path, status = %status, "Host API error");
            return Err(PaymentError::host_unavailable(format!(
                "HTTP {}: {}",
                status, text
            )));
        }

        debug!(path = %path, status = %status, "Host request completed");
        Ok(response)
    }

    async fn send<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> PaymentResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_raw(method, url, body)
            .await?
            .json::<T>()
            .await
            .map_err(|e| PaymentError::host_unavailable(format!("Invalid response format: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayConfigResponse {
    api_token: String,
    token_code: String,
    service_id: String,
    #[serde(default)]
    test_mode: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayableResponse {
    account_id: i64,
    amount: Decimal,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct SuccessUrlResponse {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordPaymentBody<'a> {
    account_id: i64,
    component: &'a str,
    payment_area: &'a str,
    item_id: i64,
    user_id: i64,
    amount: Decimal,
    currency: &'a str,
    gateway: &'a str,
    reference: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordPaymentResponse {
    payment_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeliverItemBody<'a> {
    component: &'a str,
    payment_area: &'a str,
    item_id: i64,
    user_id: i64,
    payment_id: i64,
}

#[async_trait]
impl CredentialsSource for HostClient {
    async fn credentials_for(&self, item: &ItemRef) -> PaymentResult<GatewayCredentials> {
        let url = self.item_url("/api/payment/gateway-config", item)?;
        let response: GatewayConfigResponse = self.send::<_, ()>(Method::GET, url, None).await?;
        Ok(GatewayCredentials {
            api_token: response.api_token,
            token_code: response.token_code,
            service_id: response.service_id,
            test_mode: response.test_mode,
        })
    }
}

#[async_trait]
impl PayableSource for HostClient {
    async fn payable_for(&self, item: &ItemRef) -> PaymentResult<Payable> {
        let url = self.item_url("/api/payment/payable", item)?;
        let response: PayableResponse = self.send::<_, ()>(Method::GET, url, None).await?;
        Ok(Payable {
            account_id: response.account_id,
            amount: response.amount,
            currency: response.currency,
        })
    }

    async fn success_url(&self, item: &ItemRef) -> PaymentResult<Option<String>> {
        let url = self.item_url("/api/payment/success-url", item)?;
        let response: SuccessUrlResponse = self.send::<_, ()>(Method::GET, url, None).await?;
        Ok(response.url.filter(|u| !u.is_empty()))
    }
}

#[async_trait]
impl DeliveryHook for HostClient {
    async fn record_payment(&self, request: &PaymentRecordRequest) -> PaymentResult<i64> {
        let body = RecordPaymentBody {
            account_id: request.account_id,
            component: &request.scope.component,
            payment_area: &request.scope.payment_area,
            item_id: request.scope.item_id,
            user_id: request.scope.user_id,
            amount: request.amount,
            currency: &request.currency,
            gateway: &request.gateway,
            reference: request.reference.to_string(),
        };
        let response: RecordPaymentResponse = self
            .send(Method::POST, self.url("/api/payment/payments")?, Some(&body))
            .await?;
        Ok(response.payment_id)
    }

    async fn deliver_item(&self, scope: &Scope, payment_id: i64) -> PaymentResult<()> {
        let body = DeliverItemBody {
            component: &scope.component,
            payment_area: &scope.payment_area,
            item_id: scope.item_id,
            user_id: scope.user_id,
            payment_id,
        };
        self.send_raw(Method::POST, self.url("/api/payment/deliver")?, Some(&body))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HostClient {
        HostClient::new(HostConfig {
            base_url: "https://lms.example.com/".to_string(),
            api_token: "token".to_string(),
            gateway_name: "paynl".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_item_url_carries_scope() {
        let item = ItemRef {
            component: "enrol_fee".to_string(),
            payment_area: "fee".to_string(),
            item_id: 42,
        };
        let url = client().item_url("/api/payment/payable", &item).unwrap();
        assert_eq!(
            url.as_str(),
            "https://lms.example.com/api/payment/payable?component=enrol_fee&paymentarea=fee&itemid=42&gateway=paynl"
        );
    }

    #[test]
    fn test_payable_response_accepts_string_amount() {
        let response: PayableResponse =
            serde_json::from_str(r#"{"accountId": 3, "amount": "19.99", "currency": "EUR"}"#)
                .unwrap();
        assert_eq!(response.amount.to_string(), "19.99");
    }
}
