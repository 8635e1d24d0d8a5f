//! Shared fakes for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use paynl_bridge::database::{InMemoryTransactionStore, TransactionRecord, TransactionStore};
use paynl_bridge::payments::scope;
use paynl_bridge::payments::types::{
    CreateTransactionRequest, CreatedTransaction, GatewayCredentials, ItemRef, Payable,
    PaymentRecordRequest, RemoteObservation, Scope,
};
use paynl_bridge::payments::{
    CallbackService, CallbackSigner, CredentialsSource, DeliveryHook, EngineConfig,
    PayableSource, PaymentInitiator, ReconciliationEngine, RemoteGateway,
};
use paynl_bridge::{PaymentError, PaymentResult};

pub const SECRET: &str = "0123456789abcdef0123";
pub const PUBLIC_BASE_URL: &str = "https://pay.example.com";
pub const SITE_ROOT: &str = "https://lms.example.com/";
pub const SUCCESS_URL: &str = "https://lms.example.com/course/view.php?id=42";

/// Scripted processor: remote statuses are set by the test
#[derive(Default)]
pub struct FakeGateway {
    orders: Mutex<HashMap<String, RemoteObservation>>,
    created: Mutex<Vec<CreateTransactionRequest>>,
    next_order: AtomicUsize,
    status_calls: AtomicUsize,
    unavailable: AtomicBool,
    create_fails: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FakeGateway {
    pub fn set_status(&self, order_id: &str, code: i32, name: &str, metadata: &str) {
        self.orders.lock().unwrap().insert(
            order_id.to_string(),
            RemoteObservation {
                order_id: order_id.to_string(),
                status_code: code,
                status_name: name.to_string(),
                metadata: metadata.to_string(),
            },
        );
    }

    /// Change only the status of an order the gateway already knows
    pub fn transition(&self, order_id: &str, code: i32, name: &str) {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(order_id).expect("unknown order");
        order.status_code = code;
        order.status_name = name.to_string();
    }

    pub fn observation(&self, order_id: &str) -> RemoteObservation {
        self.orders.lock().unwrap()[order_id].clone()
    }

    pub fn created(&self) -> Vec<CreateTransactionRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }

    pub fn set_create_fails(&self, value: bool) {
        self.create_fails.store(value, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn create_transaction(
        &self,
        _credentials: &GatewayCredentials,
        request: CreateTransactionRequest,
    ) -> PaymentResult<CreatedTransaction> {
        if self.create_fails.load(Ordering::SeqCst) {
            return Err(PaymentError::gateway("service not enabled"));
        }

        let n = self.next_order.fetch_add(1, Ordering::SeqCst) + 1;
        let order_id = format!("EX-{:04}", n);
        self.set_status(&order_id, 20, "PENDING", &scope::encode(&request.scope));
        self.created.lock().unwrap().push(request);

        Ok(CreatedTransaction {
            transaction_id: order_id.clone(),
            payment_reference: format!("7000-0000-{:04}", n),
            redirect_url: format!("https://pay.example/checkout/{}", order_id),
        })
    }

    async fn get_status(
        &self,
        _credentials: &GatewayCredentials,
        transaction_id: &str,
    ) -> PaymentResult<RemoteObservation> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::remote_unavailable("connection refused"));
        }

        self.orders
            .lock()
            .unwrap()
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| PaymentError::gateway(format!("order {} not found", transaction_id)))
    }
}

/// Host platform double recording every delivery call
pub struct FakeHost {
    payment_requests: Mutex<Vec<PaymentRecordRequest>>,
    deliveries: Mutex<Vec<(Scope, i64)>>,
    deliver_calls: AtomicUsize,
    failing_deliveries: AtomicUsize,
    next_payment_id: AtomicI64,
    pub payable: Payable,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            payment_requests: Mutex::new(Vec::new()),
            deliveries: Mutex::new(Vec::new()),
            deliver_calls: AtomicUsize::new(0),
            failing_deliveries: AtomicUsize::new(0),
            next_payment_id: AtomicI64::new(1000),
            payable: Payable {
                account_id: 3,
                amount: dec!(19.99),
                currency: "EUR".to_string(),
            },
        }
    }
}

impl FakeHost {
    /// Make the next `n` item deliveries fail
    pub fn fail_deliveries(&self, n: usize) {
        self.failing_deliveries.store(n, Ordering::SeqCst);
    }

    pub fn payment_requests(&self) -> Vec<PaymentRecordRequest> {
        self.payment_requests.lock().unwrap().clone()
    }

    pub fn deliveries(&self) -> Vec<(Scope, i64)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn deliver_calls(&self) -> usize {
        self.deliver_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialsSource for FakeHost {
    async fn credentials_for(&self, _item: &ItemRef) -> PaymentResult<GatewayCredentials> {
        Ok(GatewayCredentials {
            api_token: "token".to_string(),
            token_code: "AT-0001-0002".to_string(),
            service_id: "SL-0001-0002".to_string(),
            test_mode: true,
        })
    }
}

#[async_trait]
impl PayableSource for FakeHost {
    async fn payable_for(&self, _item: &ItemRef) -> PaymentResult<Payable> {
        Ok(self.payable.clone())
    }

    async fn success_url(&self, _item: &ItemRef) -> PaymentResult<Option<String>> {
        Ok(Some(SUCCESS_URL.to_string()))
    }
}

#[async_trait]
impl DeliveryHook for FakeHost {
    async fn record_payment(&self, request: &PaymentRecordRequest) -> PaymentResult<i64> {
        self.payment_requests.lock().unwrap().push(request.clone());
        Ok(self.next_payment_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn deliver_item(&self, scope: &Scope, payment_id: i64) -> PaymentResult<()> {
        self.deliver_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_deliveries.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_deliveries.store(failing - 1, Ordering::SeqCst);
            return Err(PaymentError::host_unavailable("enrolment service down"));
        }

        self.deliveries
            .lock()
            .unwrap()
            .push((scope.clone(), payment_id));
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<InMemoryTransactionStore>,
    pub gateway: Arc<FakeGateway>,
    pub host: Arc<FakeHost>,
    pub engine: Arc<ReconciliationEngine>,
    pub signer: CallbackSigner,
    pub initiator: PaymentInitiator,
    pub callbacks: CallbackService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryTransactionStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let host = Arc::new(FakeHost::default());

        let engine = Arc::new(ReconciliationEngine::new(
            store.clone(),
            gateway.clone(),
            host.clone(),
            host.clone(),
            host.clone(),
            config,
        ));

        let signer = CallbackSigner::new(SECRET);
        let initiator = PaymentInitiator::new(engine.clone(), signer.clone(), PUBLIC_BASE_URL);
        let callbacks = CallbackService::new(engine.clone(), signer.clone(), SITE_ROOT);

        Self {
            store,
            gateway,
            host,
            engine,
            signer,
            initiator,
            callbacks,
        }
    }

    /// Insert a record directly, bypassing initiation
    pub async fn seed(
        &self,
        scope: Scope,
        transaction_id: &str,
        status_code: i32,
        modified: DateTime<Utc>,
    ) -> TransactionRecord {
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            user_id: scope.user_id,
            component: scope.component.clone(),
            payment_area: scope.payment_area.clone(),
            item_id: scope.item_id,
            transaction_id: transaction_id.to_string(),
            payment_reference: String::new(),
            status: if status_code == 0 { "INIT" } else { "SEEDED" }.to_string(),
            status_code,
            test_mode: true,
            payment_id: None,
            delivery_attempts: 0,
            delivery_claimed_at: None,
            time_created: modified,
            time_modified: modified,
        };
        self.store.put(record.clone()).await;
        record
    }

    pub async fn record(&self, transaction_id: &str) -> TransactionRecord {
        self.store
            .find_by_transaction_id(transaction_id)
            .await
            .unwrap()
            .expect("record exists")
    }
}

pub fn enrol_scope() -> Scope {
    Scope::new("enrol_fee", "fee", 42, 7)
}

pub fn hours_ago(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    now - ChronoDuration::hours(hours)
}
