//! Idempotency ledger.
//!
//! The ledger maps `(idempotency key, operation)` to the resource id the
//! operation produced the first time it succeeded, so a retried create can
//! replay its prior result instead of creating a second resource.
//!
//! The check-then-act sequence (lookup, perform, record) is racy under
//! concurrent identical retries, so the storage layer owns uniqueness: a
//! backend's [`LedgerStore::insert_if_absent`] is an atomic first-writer-wins
//! insert that hands the losing writer the winning record. The
//! [`IdempotencyLedger`] facade builds the replay semantics on top of it.

mod memory;
mod pg;
mod sweeper;

pub use memory::MemoryLedger;
pub use pg::PgLedger;
pub use sweeper::RetentionSweeper;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{FerryError, Result};

/// One recorded idempotent outcome. Read-only once written.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    /// Caller-supplied opaque key.
    pub idempotency_key: String,

    /// Operation label, e.g. "CreateUser".
    pub operation: String,

    /// Id of the resource the first successful run produced.
    pub resource_id: i64,

    /// When the record was written; drives retention.
    pub created_at: DateTime<Utc>,
}

/// Storage backend for ledger records.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create backing schema/tables. Idempotent.
    async fn init_schema(&self) -> Result<()>;

    /// Fetch the record for `(key, operation)`, if any.
    async fn find(&self, key: &str, operation: &str) -> Result<Option<LedgerRecord>>;

    /// Insert unless a record for the same `(key, operation)` already
    /// exists. Returns `None` when this call won, or the pre-existing
    /// record when it lost.
    async fn insert_if_absent(&self, record: LedgerRecord) -> Result<Option<LedgerRecord>>;

    /// Delete every record created before `cutoff`; returns how many went.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Outcome of [`IdempotencyLedger::execute`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOutcome {
    /// Resource id of the operation, whichever run produced it.
    pub resource_id: i64,

    /// True when a prior (or concurrently winning) run's result was
    /// replayed instead of this call's own write.
    pub replayed: bool,
}

/// Replay-or-perform facade over a [`LedgerStore`].
pub struct IdempotencyLedger {
    store: Arc<dyn LedgerStore>,
}

impl IdempotencyLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Resource id previously recorded for `(key, operation)`, if any.
    ///
    /// A blank key on an idempotent-sensitive operation is a client error.
    pub async fn lookup(&self, key: &str, operation: &str) -> Result<Option<i64>> {
        validate_key(key, operation)?;
        Ok(self
            .store
            .find(key, operation)
            .await?
            .map(|r| r.resource_id))
    }

    /// Record the outcome of a newly performed operation.
    ///
    /// Losing to an identical concurrent record (same resource id) is fine;
    /// an existing record with a *different* resource id means the caller
    /// reused a key for a different outcome, which is rejected and logged
    /// as a consistency violation, never overwritten.
    pub async fn record(&self, key: &str, operation: &str, resource_id: i64) -> Result<()> {
        validate_key(key, operation)?;

        let record = LedgerRecord {
            idempotency_key: key.to_string(),
            operation: operation.to_string(),
            resource_id,
            created_at: Utc::now(),
        };

        match self.store.insert_if_absent(record).await? {
            None => Ok(()),
            Some(existing) if existing.resource_id == resource_id => Ok(()),
            Some(existing) => {
                warn!(
                    "Idempotency key {:?} for {} already maps to resource {}, rejected attempt to record resource {}",
                    key, operation, existing.resource_id, resource_id
                );
                Err(FerryError::Consistency {
                    key: key.to_string(),
                    operation: operation.to_string(),
                    existing: existing.resource_id,
                    attempted: resource_id,
                })
            }
        }
    }

    /// Run the full lookup → perform → record sequence.
    ///
    /// On a ledger hit the prior resource id is replayed and `create` never
    /// runs. On a miss `create` runs and its result is recorded; if an
    /// identical retry won the insert race in the meantime, the winner's
    /// result is replayed instead (this call's freshly created resource is
    /// orphaned, the cost of the non-atomic check-then-act window).
    pub async fn execute<F, Fut>(
        &self,
        key: &str,
        operation: &str,
        create: F,
    ) -> Result<ExecuteOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<i64>>,
    {
        validate_key(key, operation)?;

        if let Some(existing) = self.store.find(key, operation).await? {
            info!(
                "Replaying {} for idempotency key {:?}: resource {}",
                operation, key, existing.resource_id
            );
            return Ok(ExecuteOutcome {
                resource_id: existing.resource_id,
                replayed: true,
            });
        }

        let resource_id = create().await?;

        let record = LedgerRecord {
            idempotency_key: key.to_string(),
            operation: operation.to_string(),
            resource_id,
            created_at: Utc::now(),
        };

        match self.store.insert_if_absent(record).await? {
            None => Ok(ExecuteOutcome {
                resource_id,
                replayed: false,
            }),
            Some(winner) => {
                warn!(
                    "Lost insert race on idempotency key {:?} for {}; replaying winner's resource {} (resource {} is orphaned)",
                    key, operation, winner.resource_id, resource_id
                );
                Ok(ExecuteOutcome {
                    resource_id: winner.resource_id,
                    replayed: true,
                })
            }
        }
    }
}

fn validate_key(key: &str, operation: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(FerryError::InvalidKey(operation.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn ledger() -> IdempotencyLedger {
        IdempotencyLedger::new(Arc::new(MemoryLedger::new()))
    }

    #[tokio::test]
    async fn test_create_twice_returns_same_resource_once_created() {
        let ledger = ledger();
        let created = AtomicI64::new(0);

        let first = ledger
            .execute("K", "CreateUser", || async {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(41)
            })
            .await
            .unwrap();
        let second = ledger
            .execute("K", "CreateUser", || async {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(99)
            })
            .await
            .unwrap();

        assert_eq!(first.resource_id, 41);
        assert!(!first.replayed);
        assert_eq!(second.resource_id, 41);
        assert!(second.replayed);
        // The second create closure never ran.
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_same_key_different_outcome_is_a_consistency_violation() {
        let ledger = ledger();
        ledger.record("K", "CreateUser", 41).await.unwrap();

        // Re-recording the same outcome is a harmless no-op.
        ledger.record("K", "CreateUser", 41).await.unwrap();

        let err = ledger.record("K", "CreateUser", 42).await.unwrap_err();
        assert!(matches!(err, FerryError::Consistency { existing: 41, attempted: 42, .. }));

        // The original mapping is untouched.
        assert_eq!(ledger.lookup("K", "CreateUser").await.unwrap(), Some(41));
    }

    #[tokio::test]
    async fn test_blank_key_is_a_client_error() {
        let ledger = ledger();
        assert!(matches!(
            ledger.lookup("  ", "CreateUser").await,
            Err(FerryError::InvalidKey(_))
        ));
        assert!(matches!(
            ledger.record("", "CreateUser", 1).await,
            Err(FerryError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_operations_scope_keys_independently() {
        let ledger = ledger();
        ledger.record("K", "CreateUser", 41).await.unwrap();
        ledger.record("K", "CreateCar", 7).await.unwrap();

        assert_eq!(ledger.lookup("K", "CreateUser").await.unwrap(), Some(41));
        assert_eq!(ledger.lookup("K", "CreateCar").await.unwrap(), Some(7));
        assert_eq!(ledger.lookup("other", "CreateUser").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_create_records_nothing() {
        let ledger = ledger();
        let result = ledger
            .execute("K", "CreateUser", || async {
                Err(FerryError::Config("downstream refused".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(ledger.lookup("K", "CreateUser").await.unwrap(), None);
    }
}
