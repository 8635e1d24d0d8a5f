//! Transaction reconciliation
//!
//! Converges a local transaction record with the status the processor reports
//! and triggers delivery on the transition to paid. Every entry point (return,
//! webhook, sweep) ends up in [`ReconciliationEngine::reconcile`].
//!
//! The status write is a compare-and-set on the previously read status code, so
//! of two concurrent reconcilers observing the same transition only one writes
//! and delivers; the other takes the no-op path. A paid record whose delivery
//! failed keeps `payment_id` empty and is retried by later calls. Each attempt
//! first takes a claim through [`TransactionStore::claim_delivery`]; a live claim
//! keeps other reconcilers out until it is released or its lease runs out.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::database::repository::TransactionStore;
use crate::database::transaction_record::{StatusUpdate, TransactionRecord};
use crate::error::{PaymentError, PaymentResult};
use crate::payments::scope;
use crate::payments::traits::{CredentialsSource, DeliveryHook, PayableSource, RemoteGateway};
use crate::payments::types::{ItemRef, PaymentRecordRequest, RemoteObservation, WebhookRequest};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Gateway name recorded with delivered payments
    pub gateway_name: String,
    pub surcharge_percent: Decimal,
    /// Upper bound for a single processor call
    pub remote_timeout: Duration,
    pub max_delivery_attempts: i32,
    /// How long an unreleased delivery claim keeps other reconcilers out
    pub delivery_lease: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_name: "paynl".to_string(),
            surcharge_percent: Decimal::ZERO,
            remote_timeout: Duration::from_secs(10),
            max_delivery_attempts: 5,
            delivery_lease: Duration::from_secs(300),
        }
    }
}

pub struct ReconciliationEngine {
    store: Arc<dyn TransactionStore>,
    gateway: Arc<dyn RemoteGateway>,
    credentials: Arc<dyn CredentialsSource>,
    payables: Arc<dyn PayableSource>,
    delivery: Arc<dyn DeliveryHook>,
    config: EngineConfig,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        gateway: Arc<dyn RemoteGateway>,
        credentials: Arc<dyn CredentialsSource>,
        payables: Arc<dyn PayableSource>,
        delivery: Arc<dyn DeliveryHook>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            credentials,
            payables,
            delivery,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn RemoteGateway> {
        &self.gateway
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialsSource> {
        &self.credentials
    }

    pub fn payables(&self) -> &Arc<dyn PayableSource> {
        &self.payables
    }

    /// Run a processor call under the configured timeout
    pub async fn remote_call<T, F>(&self, call: F) -> PaymentResult<T>
    where
        F: Future<Output = PaymentResult<T>>,
    {
        match timeout(self.config.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PaymentError::remote_unavailable(format!(
                "no response within {}s",
                self.config.remote_timeout.as_secs()
            ))),
        }
    }

    /// Fetch the current processor status using the item's own credentials
    pub async fn fetch_observation(
        &self,
        item: &ItemRef,
        transaction_id: &str,
    ) -> PaymentResult<RemoteObservation> {
        let credentials = self.credentials.credentials_for(item).await?;
        self.remote_call(self.gateway.get_status(&credentials, transaction_id))
            .await
    }

    /// Resolve a server-push notification to a fresh processor status
    pub async fn observe_webhook(
        &self,
        item: &ItemRef,
        request: &WebhookRequest,
    ) -> PaymentResult<RemoteObservation> {
        let credentials = self.credentials.credentials_for(item).await?;
        self.remote_call(self.gateway.get_for_webhook(&credentials, request))
            .await
    }

    /// Converge a transaction record with the processor status.
    ///
    /// At least one side must be given; the missing one is fetched. Returns the
    /// observation the decision was based on.
    pub async fn reconcile(
        &self,
        observation: Option<RemoteObservation>,
        record: Option<TransactionRecord>,
    ) -> PaymentResult<RemoteObservation> {
        let (observation, record) = match (observation, record) {
            (None, None) => {
                return Err(PaymentError::invalid_argument(
                    "provide the remote observation, the transaction record or both",
                ))
            }
            (Some(observation), Some(record)) => {
                if observation.order_id != record.transaction_id {
                    warn!(
                        record_id = %record.id,
                        transaction_id = %record.transaction_id,
                        order_id = %observation.order_id,
                        "Remote observation belongs to another transaction"
                    );
                    return Err(PaymentError::invalid_argument(format!(
                        "observation for order {} does not belong to transaction {}",
                        observation.order_id, record.transaction_id
                    )));
                }
                (observation, record)
            }
            (None, Some(record)) => {
                let observation = self
                    .fetch_observation(&record.scope().item(), &record.transaction_id)
                    .await?;
                (observation, record)
            }
            (Some(observation), None) => {
                let record = self
                    .store
                    .find_by_transaction_id(&observation.order_id)
                    .await?
                    .ok_or_else(|| PaymentError::record_not_found(&observation.order_id))?;
                (observation, record)
            }
        };

        if let Err(e) = scope::verify(&observation.metadata, &record) {
            warn!(
                record_id = %record.id,
                transaction_id = %record.transaction_id,
                error = %e,
                "Remote transaction scope does not match local record"
            );
            return Err(e);
        }

        let record = if observation.status_code != record.status_code {
            let update = StatusUpdate {
                status: observation.status_name.clone(),
                status_code: observation.status_code,
                modified_at: Utc::now(),
            };
            match self
                .store
                .compare_and_set_status(record.id, record.status_code, &update)
                .await?
            {
                Some(updated) => {
                    info!(
                        record_id = %record.id,
                        transaction_id = %record.transaction_id,
                        from = record.status_code,
                        to = updated.status_code,
                        status = %updated.status,
                        "Transaction status updated"
                    );
                    updated
                }
                None => {
                    debug!(
                        record_id = %record.id,
                        "Status already moved by a concurrent reconcile"
                    );
                    return Ok(observation);
                }
            }
        } else if observation.is_paid() && !record.is_delivered() {
            debug!(
                record_id = %record.id,
                attempts = record.delivery_attempts,
                "Paid transaction not delivered yet; retrying delivery"
            );
            record
        } else {
            debug!(
                record_id = %record.id,
                status_code = record.status_code,
                "Status unchanged"
            );
            return Ok(observation);
        };

        if observation.is_paid() {
            self.deliver(&record).await?;
        }

        Ok(observation)
    }

    async fn deliver(&self, record: &TransactionRecord) -> PaymentResult<()> {
        if record.is_delivered() {
            debug!(record_id = %record.id, "Order already delivered");
            return Ok(());
        }

        if record.delivery_attempts >= self.config.max_delivery_attempts {
            error!(
                record_id = %record.id,
                transaction_id = %record.transaction_id,
                attempts = record.delivery_attempts,
                "Delivery attempts exhausted; manual intervention required"
            );
            return Err(PaymentError::delivery_failed(format!(
                "gave up after {} attempts",
                record.delivery_attempts
            )));
        }

        let now = Utc::now();
        if !self
            .store
            .claim_delivery(
                record.id,
                record.delivery_attempts,
                now,
                lease_cutoff(now, self.config.delivery_lease),
            )
            .await?
        {
            debug!(record_id = %record.id, "Delivery claimed by a concurrent reconcile");
            return Ok(());
        }

        match self.deliver_claimed(record).await {
            Ok((payment_id, request)) => {
                info!(
                    record_id = %record.id,
                    transaction_id = %record.transaction_id,
                    payment_id,
                    amount = %request.amount,
                    currency = %request.currency,
                    "Order delivered"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(release) = self.store.release_delivery(record.id).await {
                    warn!(
                        record_id = %record.id,
                        error = %release,
                        "Could not release delivery claim; retry waits for the lease to expire"
                    );
                }
                Err(e)
            }
        }
    }

    async fn deliver_claimed(
        &self,
        record: &TransactionRecord,
    ) -> PaymentResult<(i64, PaymentRecordRequest)> {
        let scope = record.scope();
        let payable = self
            .payables
            .payable_for(&scope.item())
            .await
            .map_err(|e| delivery_error(record, "payable lookup", e))?;

        let request = PaymentRecordRequest {
            account_id: payable.account_id,
            scope: scope.clone(),
            amount: payable.cost_with_surcharge(self.config.surcharge_percent),
            currency: payable.currency.clone(),
            gateway: self.config.gateway_name.clone(),
            reference: record.id,
        };

        let payment_id = self
            .delivery
            .record_payment(&request)
            .await
            .map_err(|e| delivery_error(record, "payment recording", e))?;

        self.delivery
            .deliver_item(&scope, payment_id)
            .await
            .map_err(|e| delivery_error(record, "item delivery", e))?;

        if !self
            .store
            .set_payment_id(record.id, payment_id, Utc::now())
            .await?
        {
            warn!(
                record_id = %record.id,
                payment_id,
                "Payment id was already set; keeping the existing one"
            );
        }

        Ok((payment_id, request))
    }
}

fn lease_cutoff(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|lease| now.checked_sub_signed(lease))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn delivery_error(record: &TransactionRecord, stage: &str, e: PaymentError) -> PaymentError {
    error!(
        record_id = %record.id,
        transaction_id = %record.transaction_id,
        stage,
        error = %e,
        "Delivery failed"
    );
    PaymentError::delivery_failed(format!("{}: {}", stage, e))
}
