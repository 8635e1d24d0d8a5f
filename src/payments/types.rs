//! Payment domain types
//!
//! Types shared by the reconciliation engine, the entry points and the
//! collaborator traits.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// PAY. status code for a paid transaction
pub const STATUS_PAID: i32 = 100;
/// PAY. status code for an expired transaction
pub const STATUS_EXPIRED: i32 = -80;
/// PAY. status code for a cancelled transaction
pub const STATUS_CANCEL: i32 = -90;

/// Status codes the processor reports while a payment is still open
const PENDING_CODES: [i32; 5] = [20, 25, 40, 50, 90];

/// Default terminal set used by the sweep
pub const TERMINAL_STATUS_CODES: [i32; 3] = [STATUS_EXPIRED, STATUS_CANCEL, STATUS_PAID];

/// What was purchased and by whom
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub component: String,
    pub payment_area: String,
    pub item_id: i64,
    pub user_id: i64,
}

impl Scope {
    pub fn new(
        component: impl Into<String>,
        payment_area: impl Into<String>,
        item_id: i64,
        user_id: i64,
    ) -> Self {
        Self {
            component: component.into(),
            payment_area: payment_area.into(),
            item_id,
            user_id,
        }
    }

    /// The part of the scope that selects the merchant account
    pub fn item(&self) -> ItemRef {
        ItemRef {
            component: self.component.clone(),
            payment_area: self.payment_area.clone(),
            item_id: self.item_id,
        }
    }
}

/// Purchasable resource, without the paying user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub component: String,
    pub payment_area: String,
    pub item_id: i64,
}

/// Field of the scope tuple, used to report mismatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeField {
    Component,
    PaymentArea,
    ItemId,
    UserId,
}

impl ScopeField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeField::Component => "component",
            ScopeField::PaymentArea => "paymentarea",
            ScopeField::ItemId => "itemid",
            ScopeField::UserId => "userid",
        }
    }
}

impl fmt::Display for ScopeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a processor status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusClass {
    Paid,
    Pending,
    Canceled,
    Other,
}

impl StatusClass {
    pub fn from_code(code: i32) -> Self {
        if code == STATUS_PAID {
            StatusClass::Paid
        } else if code < 0 {
            StatusClass::Canceled
        } else if PENDING_CODES.contains(&code) {
            StatusClass::Pending
        } else {
            StatusClass::Other
        }
    }
}

/// Snapshot of a transaction as reported by the processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteObservation {
    /// Processor transaction / order id
    pub order_id: String,
    pub status_code: i32,
    pub status_name: String,
    /// Opaque metadata echoed back by the processor (`component|area|item|user`)
    pub metadata: String,
}

impl RemoteObservation {
    pub fn class(&self) -> StatusClass {
        StatusClass::from_code(self.status_code)
    }

    pub fn is_paid(&self) -> bool {
        self.class() == StatusClass::Paid
    }

    pub fn is_canceled(&self) -> bool {
        self.class() == StatusClass::Canceled
    }
}

/// Per-merchant-account processor credentials
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayCredentials {
    /// API token (secret)
    pub api_token: String,
    /// Token code, `AT-....`
    pub token_code: String,
    /// Service id, `SL-....`
    pub service_id: String,
    pub test_mode: bool,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("api_token", &"***")
            .field("token_code", &self.token_code)
            .field("service_id", &self.service_id)
            .field("test_mode", &self.test_mode)
            .finish()
    }
}

/// Price information for a purchasable resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payable {
    pub account_id: i64,
    pub amount: Decimal,
    pub currency: String,
}

impl Payable {
    /// Amount including the gateway surcharge, rounded to cents
    pub fn cost_with_surcharge(&self, surcharge_percent: Decimal) -> Decimal {
        let hundred = Decimal::ONE_HUNDRED;
        (self.amount * (hundred + surcharge_percent) / hundred)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// Redirect and webhook URLs handed to the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackUrls {
    pub return_url: String,
    pub exchange_url: String,
}

/// Request to start a transaction at the processor
#[derive(Debug, Clone)]
pub struct CreateTransactionRequest {
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub scope: Scope,
    pub urls: CallbackUrls,
    pub test_mode: bool,
    pub payment_method_id: Option<i64>,
    pub bank_id: Option<i64>,
}

/// Result of starting a transaction at the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTransaction {
    pub transaction_id: String,
    pub payment_reference: String,
    pub redirect_url: String,
}

/// Raw server-push request from the processor
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub params: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl WebhookRequest {
    /// Processor order id from the query string or the JSON body
    pub fn order_id(&self) -> Option<String> {
        for key in ["order_id", "orderId"] {
            if let Some(value) = self.params.get(key).filter(|v| !v.is_empty()) {
                return Some(value.clone());
            }
        }

        let body = self.body.as_ref()?;
        body.get("order_id")
            .or_else(|| body.pointer("/object/orderId"))
            .or_else(|| body.pointer("/object/id"))
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Payment details passed to the delivery hook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecordRequest {
    pub account_id: i64,
    pub scope: Scope,
    pub amount: Decimal,
    pub currency: String,
    pub gateway: String,
    /// Internal transaction record id; stable across delivery retries
    pub reference: uuid::Uuid,
}
