use crate::database::error::DatabaseError;
use crate::database::transaction_record::{
    NewTransactionRecord, StatusUpdate, SweepQuery, TransactionRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence port for transaction records
///
/// Mutating operations that guard the delivery invariant are conditional:
/// they only apply when the row still holds the value the caller read, and
/// report whether they did.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a new record with status INIT / code 0
    async fn insert(&self, record: NewTransactionRecord) -> Result<TransactionRecord, DatabaseError>;

    /// Find a record by its internal id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>, DatabaseError>;

    /// Find the record for a processor transaction id
    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<TransactionRecord>, DatabaseError>;

    /// All records belonging to a user (export)
    async fn find_by_user(&self, user_id: i64) -> Result<Vec<TransactionRecord>, DatabaseError>;

    /// Records eligible for the periodic sweep, newest `time_modified` first
    async fn find_sweep_candidates(
        &self,
        query: &SweepQuery,
    ) -> Result<Vec<TransactionRecord>, DatabaseError>;

    /// Write a new status only if the stored code still equals `expected_code`.
    ///
    /// Returns the updated record, or `None` when another writer got there first.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected_code: i32,
        update: &StatusUpdate,
    ) -> Result<Option<TransactionRecord>, DatabaseError>;

    /// Take the right to attempt delivery.
    ///
    /// Increments `delivery_attempts` and stamps `delivery_claimed_at` with `now`
    /// only if the count still equals `expected_attempts`, no payment id has been
    /// set yet and no claim newer than `stale_before` is held.
    async fn claim_delivery(
        &self,
        id: Uuid,
        expected_attempts: i32,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Drop the claim of a failed delivery attempt so it can be retried
    async fn release_delivery(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Set the payment id if none is set yet
    async fn set_payment_id(
        &self,
        id: Uuid,
        payment_id: i64,
        modified_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Remove all records of a user (erasure)
    async fn delete_by_user(&self, user_id: i64) -> Result<u64, DatabaseError>;
}
