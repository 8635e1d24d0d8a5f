//! Transaction record entity
//!
//! One row per initiated payment attempt, keyed by an internal id and the
//! processor-assigned transaction id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payments::types::Scope;

/// Status name written for freshly created records
pub const INIT_STATUS: &str = "INIT";
/// Status code written for freshly created records
pub const INIT_STATUS_CODE: i32 = 0;

/// Transaction record entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct TransactionRecord {
    pub id: Uuid,
    pub user_id: i64,
    pub component: String,
    pub payment_area: String,
    pub item_id: i64,
    /// Processor-assigned transaction id, unique across the table
    pub transaction_id: String,
    pub payment_reference: String,
    pub status: String,
    pub status_code: i32,
    pub test_mode: bool,
    /// Delivered-payment record id; set exactly once on delivery
    pub payment_id: Option<i64>,
    pub delivery_attempts: i32,
    /// Set while a delivery attempt is in flight
    pub delivery_claimed_at: Option<DateTime<Utc>>,
    pub time_created: DateTime<Utc>,
    pub time_modified: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn scope(&self) -> Scope {
        Scope {
            component: self.component.clone(),
            payment_area: self.payment_area.clone(),
            item_id: self.item_id,
            user_id: self.user_id,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.payment_id.is_some()
    }
}

/// Values for inserting a new transaction record
#[derive(Debug, Clone)]
pub struct NewTransactionRecord {
    pub scope: Scope,
    pub transaction_id: String,
    pub payment_reference: String,
    pub test_mode: bool,
}

impl NewTransactionRecord {
    /// Materialize the row as it is written on insert
    pub fn into_record(self, now: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            user_id: self.scope.user_id,
            component: self.scope.component,
            payment_area: self.scope.payment_area,
            item_id: self.scope.item_id,
            transaction_id: self.transaction_id,
            payment_reference: self.payment_reference,
            status: INIT_STATUS.to_string(),
            status_code: INIT_STATUS_CODE,
            test_mode: self.test_mode,
            payment_id: None,
            delivery_attempts: 0,
            delivery_claimed_at: None,
            time_created: now,
            time_modified: now,
        }
    }
}

/// New status values written by the reconciliation engine
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: String,
    pub status_code: i32,
    pub modified_at: DateTime<Utc>,
}

/// Selection criteria for the periodic sweep
#[derive(Debug, Clone)]
pub struct SweepQuery {
    /// Status codes that need no further reconciliation
    pub terminal_codes: Vec<i32>,
    /// Paid code; paid records without a payment id are still selected
    pub paid_code: i32,
    /// Undelivered paid records are skipped once they reach this many attempts
    pub max_delivery_attempts: i32,
    /// Oldest `time_modified` to consider (inclusive)
    pub modified_after: DateTime<Utc>,
    /// Newest `time_modified` to consider (inclusive)
    pub modified_before: DateTime<Utc>,
    pub limit: i64,
}

impl SweepQuery {
    /// In-process evaluation of the selection predicate
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        let in_window = record.time_modified >= self.modified_after
            && record.time_modified <= self.modified_before;
        let open = !self.terminal_codes.contains(&record.status_code);
        let undelivered = record.status_code == self.paid_code
            && record.payment_id.is_none()
            && record.delivery_attempts < self.max_delivery_attempts;

        in_window && (open || undelivered)
    }
}
