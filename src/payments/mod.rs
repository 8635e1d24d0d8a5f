//! Payment processor integration
//!
//! Reconciles locally recorded transactions with the PAY. processor and
//! delivers purchased items once a payment is confirmed.

pub mod callbacks;
pub mod initiate;
pub mod providers;
pub mod reconcile;
pub mod scope;
pub mod signing;
pub mod traits;
pub mod types;

pub use callbacks::{
    CallbackParams, CallbackService, Notice, NoticeLevel, ReturnOutcome, WebhookReply,
};
pub use initiate::{CreatePaymentRequest, CreatePaymentResponse, PaymentInitiator};
pub use reconcile::{EngineConfig, ReconciliationEngine};
pub use signing::CallbackSigner;
pub use traits::{CredentialsSource, DeliveryHook, PayableSource, RemoteGateway};
