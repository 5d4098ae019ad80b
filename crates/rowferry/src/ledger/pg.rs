//! PostgreSQL ledger backend.
//!
//! Records live in the `_rowferry` schema with a primary key on
//! `(idempotency_key, operation)`, so concurrent identical retries race on
//! the constraint instead of duplicating resources: the insert uses
//! `ON CONFLICT DO NOTHING` and a losing writer reads back the winner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;

use super::{LedgerRecord, LedgerStore};
use crate::error::{FerryError, Result};

/// Database-backed ledger store.
pub struct PgLedger {
    pool: Pool,
    schema: String,
}

impl PgLedger {
    /// Create a ledger store over an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            schema: "_rowferry".to_string(),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn init_schema(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| FerryError::pool(e.to_string(), "initializing ledger schema"))?;

        conn.execute(
            &format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema),
            &[],
        )
        .await?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {}.idempotency_records (
                    idempotency_key TEXT NOT NULL,
                    operation TEXT NOT NULL,
                    resource_id BIGINT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL,
                    PRIMARY KEY (idempotency_key, operation)
                )",
                self.schema
            ),
            &[],
        )
        .await?;

        // Index for the retention sweep's cutoff scan.
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_idempotency_records_created_at
                    ON {}.idempotency_records(created_at)",
                self.schema
            ),
            &[],
        )
        .await?;

        Ok(())
    }

    async fn find(&self, key: &str, operation: &str) -> Result<Option<LedgerRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| FerryError::pool(e.to_string(), "looking up ledger record"))?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT idempotency_key, operation, resource_id, created_at
                     FROM {}.idempotency_records
                     WHERE idempotency_key = $1 AND operation = $2",
                    self.schema
                ),
                &[&key, &operation],
            )
            .await?;

        Ok(row.map(|r| LedgerRecord {
            idempotency_key: r.get(0),
            operation: r.get(1),
            resource_id: r.get(2),
            created_at: r.get(3),
        }))
    }

    async fn insert_if_absent(&self, record: LedgerRecord) -> Result<Option<LedgerRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| FerryError::pool(e.to_string(), "inserting ledger record"))?;

        let inserted = conn
            .execute(
                &format!(
                    "INSERT INTO {}.idempotency_records
                     (idempotency_key, operation, resource_id, created_at)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (idempotency_key, operation) DO NOTHING",
                    self.schema
                ),
                &[
                    &record.idempotency_key,
                    &record.operation,
                    &record.resource_id,
                    &record.created_at,
                ],
            )
            .await?;

        if inserted == 1 {
            return Ok(None);
        }

        // Lost the race; hand back the winning record.
        let winner = self
            .find(&record.idempotency_key, &record.operation)
            .await?
            .ok_or_else(|| {
                FerryError::pool(
                    "ledger insert conflicted but the winning record is gone".to_string(),
                    "inserting ledger record",
                )
            })?;
        Ok(Some(winner))
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| FerryError::pool(e.to_string(), "purging ledger records"))?;

        let deleted = conn
            .execute(
                &format!(
                    "DELETE FROM {}.idempotency_records WHERE created_at < $1",
                    self.schema
                ),
                &[&cutoff],
            )
            .await?;

        Ok(deleted)
    }
}
