use crate::database::error::DatabaseError;
use crate::database::repository::TransactionStore;
use crate::database::transaction_record::{
    NewTransactionRecord, StatusUpdate, SweepQuery, TransactionRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory transaction record store.
///
/// Conditional writes run under the write lock, which gives them the same
/// all-or-nothing behaviour as the conditional UPDATEs of the Postgres store.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    records: Arc<RwLock<HashMap<Uuid, TransactionRecord>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record as-is, replacing any row with the same id
    pub async fn put(&self, record: TransactionRecord) {
        self.records.write().await.insert(record.id, record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, record: NewTransactionRecord) -> Result<TransactionRecord, DatabaseError> {
        let mut records = self.records.write().await;
        if records
            .values()
            .any(|r| r.transaction_id == record.transaction_id)
        {
            return Err(DatabaseError::duplicate_transaction(record.transaction_id));
        }

        let row = record.into_record(Utc::now());
        records.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>, DatabaseError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<TransactionRecord>, DatabaseError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.transaction_id == transaction_id)
            .cloned())
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<TransactionRecord>, DatabaseError> {
        let records = self.records.read().await;
        let mut found: Vec<_> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.time_created.cmp(&a.time_created));
        Ok(found)
    }

    async fn find_sweep_candidates(
        &self,
        query: &SweepQuery,
    ) -> Result<Vec<TransactionRecord>, DatabaseError> {
        let records = self.records.read().await;
        let mut found: Vec<_> = records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.time_modified.cmp(&a.time_modified));
        found.truncate(query.limit.max(0) as usize);
        Ok(found)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected_code: i32,
        update: &StatusUpdate,
    ) -> Result<Option<TransactionRecord>, DatabaseError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if record.status_code == expected_code => {
                record.status = update.status.clone();
                record.status_code = update.status_code;
                record.time_modified = update.modified_at;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn claim_delivery(
        &self,
        id: Uuid,
        expected_attempts: i32,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record)
                if record.payment_id.is_none()
                    && record.delivery_attempts == expected_attempts
                    && record.delivery_claimed_at.map_or(true, |at| at < stale_before) =>
            {
                record.delivery_attempts += 1;
                record.delivery_claimed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_delivery(&self, id: Uuid) -> Result<(), DatabaseError> {
        if let Some(record) = self.records.write().await.get_mut(&id) {
            if record.payment_id.is_none() {
                record.delivery_claimed_at = None;
            }
        }
        Ok(())
    }

    async fn set_payment_id(
        &self,
        id: Uuid,
        payment_id: i64,
        modified_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if record.payment_id.is_none() => {
                record.payment_id = Some(payment_id);
                record.time_modified = modified_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64, DatabaseError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.user_id != user_id);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::Scope;
    use chrono::Duration;

    fn new_record(transaction_id: &str, user_id: i64) -> NewTransactionRecord {
        NewTransactionRecord {
            scope: Scope::new("enrol_fee", "fee", 42, user_id),
            transaction_id: transaction_id.to_string(),
            payment_reference: "7000-0000-0001".to_string(),
            test_mode: true,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_transaction_id() {
        let store = InMemoryTransactionStore::new();
        store.insert(new_record("EX-1", 7)).await.unwrap();

        let err = store.insert(new_record("EX-1", 8)).await.unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_compare_and_set_status_only_once() {
        let store = InMemoryTransactionStore::new();
        let record = store.insert(new_record("EX-2", 7)).await.unwrap();
        let update = StatusUpdate {
            status: "PAID".to_string(),
            status_code: 100,
            modified_at: Utc::now(),
        };

        let first = store
            .compare_and_set_status(record.id, 0, &update)
            .await
            .unwrap();
        assert_eq!(first.unwrap().status_code, 100);

        let second = store
            .compare_and_set_status(record.id, 0, &update)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_payment_id_is_never_overwritten() {
        let store = InMemoryTransactionStore::new();
        let record = store.insert(new_record("EX-3", 7)).await.unwrap();

        let now = Utc::now();
        let stale = now - Duration::minutes(5);

        assert!(store.claim_delivery(record.id, 0, now, stale).await.unwrap());
        assert!(!store.claim_delivery(record.id, 0, now, stale).await.unwrap());
        assert!(store.set_payment_id(record.id, 11, now).await.unwrap());
        assert!(!store.set_payment_id(record.id, 12, now).await.unwrap());
        assert!(!store.claim_delivery(record.id, 1, now, stale).await.unwrap());

        let stored = store.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_id, Some(11));
    }

    #[tokio::test]
    async fn test_active_claim_blocks_until_released() {
        let store = InMemoryTransactionStore::new();
        let record = store.insert(new_record("EX-7", 7)).await.unwrap();
        let now = Utc::now();
        let stale = now - Duration::minutes(5);

        assert!(store.claim_delivery(record.id, 0, now, stale).await.unwrap());
        // Same attempt count as seen after the first claim, but the claim is live
        assert!(!store.claim_delivery(record.id, 1, now, stale).await.unwrap());

        store.release_delivery(record.id).await.unwrap();
        assert!(store.claim_delivery(record.id, 1, now, stale).await.unwrap());

        // An abandoned claim expires
        let later = now + Duration::minutes(10);
        assert!(store
            .claim_delivery(record.id, 2, later, later - Duration::minutes(5))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_sweep_candidates_window_and_order() {
        let store = InMemoryTransactionStore::new();
        let now = Utc::now();

        for (tx, age_hours, code) in [
            ("fresh", 12, 20),
            ("three-days", 72, 20),
            ("two-days", 48, 0),
            ("stale", 240, 20),
            ("cancelled", 72, -90),
        ] {
            let mut record = new_record(tx, 7).into_record(now);
            record.status_code = code;
            record.time_modified = now - Duration::hours(age_hours);
            store.put(record).await;
        }

        let query = SweepQuery {
            terminal_codes: vec![-80, -90, 100],
            paid_code: 100,
            max_delivery_attempts: 5,
            modified_after: now - Duration::days(7),
            modified_before: now - Duration::days(1),
            limit: 10,
        };
        let found = store.find_sweep_candidates(&query).await.unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.transaction_id.as_str()).collect();
        assert_eq!(ids, vec!["two-days", "three-days"]);
    }

    #[tokio::test]
    async fn test_delete_by_user() {
        let store = InMemoryTransactionStore::new();
        store.insert(new_record("EX-4", 7)).await.unwrap();
        store.insert(new_record("EX-5", 7)).await.unwrap();
        store.insert(new_record("EX-6", 8)).await.unwrap();

        assert_eq!(store.find_by_user(7).await.unwrap().len(), 2);
        assert_eq!(store.delete_by_user(7).await.unwrap(), 2);
        assert_eq!(store.len().await, 1);
    }
}
