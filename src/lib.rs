//! PAY. payment gateway bridge
//!
//! Starts payments at the PAY. processor on behalf of a host platform, keeps a
//! local record per transaction and reconciles it with the processor through
//! the return redirect, the exchange webhook and a periodic sweep. A confirmed
//! payment is recorded and the purchased item delivered exactly once.

pub mod api;
#[cfg(feature = "cache")]
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod host;
pub mod payments;
pub mod workers;

pub use error::{PaymentError, PaymentResult};
pub use payments::{
    CallbackService, CreatePaymentRequest, CreatePaymentResponse, EngineConfig, PaymentInitiator,
    ReconciliationEngine,
};
pub use workers::{SweepConfig, SweepReport, SweepWorker};
