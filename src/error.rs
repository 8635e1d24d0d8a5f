//! Payment error taxonomy

use thiserror::Error;

use crate::database::error::DatabaseError;
use crate::payments::types::ScopeField;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Transaction record not found for transaction {transaction_id}")]
    RecordNotFound { transaction_id: String },

    #[error("Transaction invalid: {field} mismatch")]
    ScopeMismatch { field: ScopeField },

    #[error("Payment processor unavailable: {message}")]
    RemoteUnavailable { message: String },

    #[error("Delivery failed: {message}")]
    DeliveryFailed { message: String },

    #[error("Payment processor rejected the request: {message}")]
    Gateway { message: String },

    #[error("Callback signature invalid")]
    InvalidSignature,

    #[error("Host platform unavailable: {message}")]
    HostUnavailable { message: String },

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),
}

impl PaymentError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn record_not_found(transaction_id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            transaction_id: transaction_id.into(),
        }
    }

    pub fn remote_unavailable(message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            message: message.into(),
        }
    }

    pub fn delivery_failed(message: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            message: message.into(),
        }
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway {
            message: message.into(),
        }
    }

    pub fn host_unavailable(message: impl Into<String>) -> Self {
        Self::HostUnavailable {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PaymentError::RecordNotFound { .. })
    }

    /// Transient failures that a later sweep or callback may get past
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::RemoteUnavailable { .. }
            | PaymentError::HostUnavailable { .. }
            | PaymentError::DeliveryFailed { .. } => true,
            PaymentError::Database(e) => e.is_retryable(),
            _ => false,
        }
    }
}
