use crate::database::error::DatabaseError;
use crate::database::repository::TransactionStore;
use crate::database::transaction_record::{
    NewTransactionRecord, StatusUpdate, SweepQuery, TransactionRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

const COLUMNS: &str = "id, user_id, component, payment_area, item_id, transaction_id, \
     payment_reference, status, status_code, test_mode, payment_id, delivery_attempts, \
     delivery_claimed_at, time_created, time_modified";

/// Postgres-backed transaction record store
pub struct TransactionRecordRepository {
    pool: PgPool,
}

impl TransactionRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for TransactionRecordRepository {
    async fn insert(&self, record: NewTransactionRecord) -> Result<TransactionRecord, DatabaseError> {
        let row = record.into_record(Utc::now());

        sqlx::query_as::<_, TransactionRecord>(&format!(
            "INSERT INTO paygw_paynl_transactions ({COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             RETURNING {COLUMNS}"
        ))
        .bind(row.id)
        .bind(row.user_id)
        .bind(&row.component)
        .bind(&row.payment_area)
        .bind(row.item_id)
        .bind(&row.transaction_id)
        .bind(&row.payment_reference)
        .bind(&row.status)
        .bind(row.status_code)
        .bind(row.test_mode)
        .bind(row.payment_id)
        .bind(row.delivery_attempts)
        .bind(row.delivery_claimed_at)
        .bind(row.time_created)
        .bind(row.time_modified)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DatabaseError::from_sqlx(e) {
            err if err.is_duplicate() => DatabaseError::duplicate_transaction(&row.transaction_id),
            err => err.with_context(format!("insert {}", row.transaction_id)),
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>, DatabaseError> {
        sqlx::query_as::<_, TransactionRecord>(&format!(
            "SELECT {COLUMNS} FROM paygw_paynl_transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<TransactionRecord>, DatabaseError> {
        sqlx::query_as::<_, TransactionRecord>(&format!(
            "SELECT {COLUMNS} FROM paygw_paynl_transactions WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<TransactionRecord>, DatabaseError> {
        sqlx::query_as::<_, TransactionRecord>(&format!(
            "SELECT {COLUMNS} FROM paygw_paynl_transactions
             WHERE user_id = $1 ORDER BY time_created DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_sweep_candidates(
        &self,
        query: &SweepQuery,
    ) -> Result<Vec<TransactionRecord>, DatabaseError> {
        sqlx::query_as::<_, TransactionRecord>(&format!(
            "SELECT {COLUMNS} FROM paygw_paynl_transactions
             WHERE time_modified >= $1 AND time_modified <= $2
               AND (status_code <> ALL($3)
                    OR (status_code = $4 AND payment_id IS NULL AND delivery_attempts < $5))
             ORDER BY time_modified DESC
             LIMIT $6"
        ))
        .bind(query.modified_after)
        .bind(query.modified_before)
        .bind(&query.terminal_codes[..])
        .bind(query.paid_code)
        .bind(query.max_delivery_attempts)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected_code: i32,
        update: &StatusUpdate,
    ) -> Result<Option<TransactionRecord>, DatabaseError> {
        let updated = sqlx::query_as::<_, TransactionRecord>(&format!(
            "UPDATE paygw_paynl_transactions
             SET status = $1, status_code = $2, time_modified = $3
             WHERE id = $4 AND status_code = $5
             RETURNING {COLUMNS}"
        ))
        .bind(&update.status)
        .bind(update.status_code)
        .bind(update.modified_at)
        .bind(id)
        .bind(expected_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if updated.is_none() {
            debug!(record_id = %id, expected_code, "status changed concurrently; update skipped");
        }
        Ok(updated)
    }

    async fn claim_delivery(
        &self,
        id: Uuid,
        expected_attempts: i32,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE paygw_paynl_transactions
             SET delivery_attempts = delivery_attempts + 1, delivery_claimed_at = $1
             WHERE id = $2 AND delivery_attempts = $3 AND payment_id IS NULL
               AND (delivery_claimed_at IS NULL OR delivery_claimed_at < $4)",
        )
        .bind(now)
        .bind(id)
        .bind(expected_attempts)
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_delivery(&self, id: Uuid) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE paygw_paynl_transactions
             SET delivery_claimed_at = NULL
             WHERE id = $1 AND payment_id IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    async fn set_payment_id(
        &self,
        id: Uuid,
        payment_id: i64,
        modified_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE paygw_paynl_transactions
             SET payment_id = $1, time_modified = $2
             WHERE id = $3 AND payment_id IS NULL",
        )
        .bind(payment_id)
        .bind(modified_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM paygw_paynl_transactions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected())
    }
}
