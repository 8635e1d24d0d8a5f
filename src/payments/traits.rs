//! Collaborator trait definitions
//!
//! The payment processor and the host platform are reached through these
//! traits; the reconciliation engine and the entry points only depend on them.

use crate::error::PaymentResult;
use crate::payments::types::{
    CreateTransactionRequest, CreatedTransaction, GatewayCredentials, ItemRef, Payable,
    PaymentRecordRequest, RemoteObservation, Scope, WebhookRequest,
};
use async_trait::async_trait;

/// Client for the remote payment processor
///
/// Credentials are passed on every call: they belong to the merchant account
/// selected by the item scope, and one process serves many accounts.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Start a transaction
    ///
    /// # Arguments
    /// * `credentials` - Merchant account credentials for the item
    /// * `request` - Amount, description, scope metadata and callback URLs
    ///
    /// # Returns
    /// * `CreatedTransaction` - Processor transaction id, payment reference and
    ///   the URL the payer must be redirected to
    async fn create_transaction(
        &self,
        credentials: &GatewayCredentials,
        request: CreateTransactionRequest,
    ) -> PaymentResult<CreatedTransaction>;

    /// Fetch the current status of a transaction
    ///
    /// # Arguments
    /// * `credentials` - Merchant account credentials for the item
    /// * `transaction_id` - Processor transaction id returned by `create_transaction`
    async fn get_status(
        &self,
        credentials: &GatewayCredentials,
        transaction_id: &str,
    ) -> PaymentResult<RemoteObservation>;

    /// Resolve the transaction a server-push notification refers to
    ///
    /// The pushed payload is only used to find the order id; the status itself
    /// is always re-fetched from the processor.
    async fn get_for_webhook(
        &self,
        credentials: &GatewayCredentials,
        request: &WebhookRequest,
    ) -> PaymentResult<RemoteObservation> {
        let order_id = request.order_id().ok_or_else(|| {
            crate::error::PaymentError::invalid_argument("webhook request carries no order id")
        })?;
        self.get_status(credentials, &order_id).await
    }
}

/// Lookup of per-merchant-account processor credentials
#[async_trait]
pub trait CredentialsSource: Send + Sync {
    async fn credentials_for(&self, item: &ItemRef) -> PaymentResult<GatewayCredentials>;
}

/// Price and redirect information the host platform keeps for an item
#[async_trait]
pub trait PayableSource: Send + Sync {
    /// Account, amount and currency for the item
    async fn payable_for(&self, item: &ItemRef) -> PaymentResult<Payable>;

    /// Page the payer lands on after a successful payment, if the host has one
    async fn success_url(&self, item: &ItemRef) -> PaymentResult<Option<String>>;
}

/// Records completed payments and grants the purchased item
///
/// Both operations may be repeated for the same `reference` when an earlier
/// delivery attempt failed half-way; implementations must treat that as a no-op.
#[async_trait]
pub trait DeliveryHook: Send + Sync {
    /// Persist a delivered-payment record and return its id
    async fn record_payment(&self, request: &PaymentRecordRequest) -> PaymentResult<i64>;

    /// Grant the purchased item to the user
    async fn deliver_item(&self, scope: &Scope, payment_id: i64) -> PaymentResult<()>;
}
