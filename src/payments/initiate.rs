//! Payment initiation
//!
//! Starts a transaction at the processor and records it locally with the
//! `INIT` status. The local record is only written once the processor has
//! accepted the transaction.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::database::transaction_record::NewTransactionRecord;
use crate::error::{PaymentError, PaymentResult};
use crate::payments::reconcile::ReconciliationEngine;
use crate::payments::scope;
use crate::payments::signing::CallbackSigner;
use crate::payments::types::{CreateTransactionRequest, CreatedTransaction, Scope, ScopeField};

/// Create-payment input from the payment UI
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub user_id: i64,
    pub component: String,
    pub payment_area: String,
    pub item_id: i64,
    pub description: String,
    #[serde(default)]
    pub payment_method_id: Option<i64>,
    #[serde(default)]
    pub bank_id: Option<i64>,
}

impl CreatePaymentRequest {
    pub fn scope(&self) -> Scope {
        Scope::new(
            self.component.clone(),
            self.payment_area.clone(),
            self.item_id,
            self.user_id,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CreatePaymentResponse {
    pub fn redirect(url: String) -> Self {
        Self {
            success: true,
            redirect_url: Some(url),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            redirect_url: None,
            message: Some(message.into()),
        }
    }
}

pub struct PaymentInitiator {
    engine: Arc<ReconciliationEngine>,
    signer: CallbackSigner,
    public_base_url: String,
}

impl PaymentInitiator {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        signer: CallbackSigner,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            signer,
            public_base_url: public_base_url.into(),
        }
    }

    /// Create-payment operation; failures are reported in the response body
    pub async fn create_payment(&self, request: CreatePaymentRequest) -> CreatePaymentResponse {
        match self.initiate(request).await {
            Ok(created) => CreatePaymentResponse::redirect(created.redirect_url),
            Err(e) => {
                warn!(error = %e, "Payment initiation failed");
                CreatePaymentResponse::failure(e.to_string())
            }
        }
    }

    pub async fn initiate(&self, request: CreatePaymentRequest) -> PaymentResult<CreatedTransaction> {
        scope::validate_name(ScopeField::Component, &request.component)?;
        scope::validate_name(ScopeField::PaymentArea, &request.payment_area)?;

        let scope = request.scope();
        let item = scope.item();

        let credentials = self.engine.credentials().credentials_for(&item).await?;
        let payable = self.engine.payables().payable_for(&item).await?;
        let amount = payable.cost_with_surcharge(self.engine.config().surcharge_percent);
        let urls = self.signer.callback_urls(&self.public_base_url, &item)?;

        let transaction_request = CreateTransactionRequest {
            amount,
            currency: payable.currency.clone(),
            description: request.description.clone(),
            scope: scope.clone(),
            urls,
            test_mode: credentials.test_mode,
            payment_method_id: request.payment_method_id,
            bank_id: request.bank_id,
        };

        let created = self
            .engine
            .remote_call(
                self.engine
                    .gateway()
                    .create_transaction(&credentials, transaction_request),
            )
            .await
            .map_err(|e| match e {
                PaymentError::Gateway { .. } => e,
                other => PaymentError::gateway(other.to_string()),
            })?;

        let new_record = NewTransactionRecord {
            scope,
            transaction_id: created.transaction_id.clone(),
            payment_reference: created.payment_reference.clone(),
            test_mode: credentials.test_mode,
        };

        let record = match self.engine.store().insert(new_record).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    transaction_id = %created.transaction_id,
                    error = %e,
                    "Processor accepted transaction but the local record could not be stored"
                );
                return Err(e.into());
            }
        };

        info!(
            record_id = %record.id,
            transaction_id = %record.transaction_id,
            amount = %amount,
            currency = %payable.currency,
            user_id = record.user_id,
            "Payment initiated"
        );

        Ok(created)
    }
}
