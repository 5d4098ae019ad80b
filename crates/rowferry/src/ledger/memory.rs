//! In-memory ledger backend for tests and single-process use.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{LedgerRecord, LedgerStore};
use crate::error::Result;

/// Ledger store backed by a map; first writer wins under the mutex the same
/// way the database constraint decides it in [`super::PgLedger`].
pub struct MemoryLedger {
    records: Mutex<HashMap<(String, String), LedgerRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn find(&self, key: &str, operation: &str) -> Result<Option<LedgerRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .get(&(key.to_string(), operation.to_string()))
            .cloned())
    }

    async fn insert_if_absent(&self, record: LedgerRecord) -> Result<Option<LedgerRecord>> {
        let mut records = self.records.lock().await;
        let slot = (record.idempotency_key.clone(), record.operation.clone());
        if let Some(existing) = records.get(&slot) {
            return Ok(Some(existing.clone()));
        }
        records.insert(slot, record);
        Ok(None)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.created_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}
