//! Retention sweep for the idempotency ledger.
//!
//! A long-lived background task that periodically deletes records older than
//! the retention window. Best-effort housekeeping: a missed cycle only means
//! the ledger grows until the next one. The sweeper runs on its own store
//! handle and holds no lock foreground lookups contend on.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::LedgerStore;
use crate::config::LedgerConfig;
use crate::error::Result;

/// Periodic ledger retention sweep with explicit lifecycle management.
pub struct RetentionSweeper {
    store: Arc<dyn LedgerStore>,
    retention: chrono::Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Self {
        Self {
            store,
            retention: chrono::Duration::days(config.retention_days),
            interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    /// Run one sweep now, returning how many records were purged.
    ///
    /// Public so callers (and tests) can drive a sweep deterministically
    /// without waiting on the timer.
    pub async fn sweep_once(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.retention;
        let purged = self.store.purge_older_than(cutoff).await?;
        if purged > 0 {
            info!("Retention sweep purged {} ledger records", purged);
        }
        Ok(purged)
    }

    /// Spawn the periodic sweep loop; it runs until `shutdown` is cancelled.
    ///
    /// The first sweep happens one full interval after start, matching a
    /// freshly booted process with nothing old enough to purge yet. A failed
    /// sweep is logged and retried on the next tick.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The immediate first tick; the loop below waits a full period.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Retention sweeper shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            error!("Retention sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerRecord, MemoryLedger};

    fn record(key: &str, age_days: i64) -> LedgerRecord {
        LedgerRecord {
            idempotency_key: key.to_string(),
            operation: "CreateUser".to_string(),
            resource_id: 1,
            created_at: Utc::now() - chrono::Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn test_sweep_purges_expired_and_keeps_fresh() {
        let store = Arc::new(MemoryLedger::new());
        store.insert_if_absent(record("old", 8)).await.unwrap();
        store.insert_if_absent(record("fresh", 6)).await.unwrap();

        let sweeper = RetentionSweeper::new(store.clone(), &LedgerConfig::default());
        let purged = sweeper.sweep_once().await.unwrap();

        assert_eq!(purged, 1);
        assert!(store.find("old", "CreateUser").await.unwrap().is_none());
        assert!(store.find("fresh", "CreateUser").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_on_empty_ledger_is_a_no_op() {
        let store = Arc::new(MemoryLedger::new());
        let sweeper = RetentionSweeper::new(store, &LedgerConfig::default());
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_stops_on_cancellation() {
        let store = Arc::new(MemoryLedger::new());
        let sweeper = RetentionSweeper::new(store, &LedgerConfig::default());

        let shutdown = CancellationToken::new();
        let handle = sweeper.spawn(shutdown.clone());
        shutdown.cancel();
        handle.await.unwrap();
    }
}
