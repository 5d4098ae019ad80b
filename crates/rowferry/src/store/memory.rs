//! In-memory store backend.
//!
//! Holds tables as decoded datasets behind a mutex. Backs tests and offline
//! development; the pipeline wiring is identical to the PostgreSQL stores,
//! only the storage differs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::sync::{mpsc, Mutex};

use super::{DestStore, EntityRow, EntityStore, RowStream, SourceStore};
use crate::codec::Dataset;
use crate::config::ReportConfig;
use crate::error::{FerryError, Result};

/// In-memory store keyed by table name.
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Dataset>>,
    report: ReportConfig,
}

impl MemoryStore {
    /// Create an empty store using the given report column names.
    pub fn new(report: ReportConfig) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            report,
        }
    }

    /// Insert (or replace) a table.
    pub async fn insert_table(&self, name: impl Into<String>, dataset: Dataset) {
        self.tables.lock().await.insert(name.into(), dataset);
    }

    /// Snapshot of a table's current contents.
    pub async fn table(&self, name: &str) -> Option<Dataset> {
        self.tables.lock().await.get(name).cloned()
    }

    async fn dataset(&self, table: &str) -> Result<Dataset> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .ok_or_else(|| FerryError::NotFound(format!("table {} does not exist", table)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(ReportConfig::default())
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn scan_table(&self, table: &str) -> Result<RowStream> {
        let dataset = self.dataset(table).await?;
        let (tx, rx) = mpsc::channel(16);

        let columns = dataset.columns.clone();
        tokio::spawn(async move {
            for row in dataset.rows {
                if tx.send(Ok(row)).await.is_err() {
                    break;
                }
            }
        });

        Ok(RowStream { columns, rows: rx })
    }
}

#[async_trait]
impl DestStore for MemoryStore {
    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.dataset(table).await?.columns)
    }

    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
    ) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let dataset = tables
            .get_mut(table)
            .ok_or_else(|| FerryError::NotFound(format!("table {} does not exist", table)))?;

        // Map incoming columns onto the table's column positions by name.
        let mut positions = Vec::with_capacity(columns.len());
        for col in columns {
            let pos = dataset.column_index(col).ok_or_else(|| {
                FerryError::ColumnMismatch {
                    table: table.to_string(),
                    missing: vec![col.clone()],
                }
            })?;
            positions.push(pos);
        }

        for row in rows {
            let mut mapped = vec![None; dataset.columns.len()];
            for (value, &pos) in row.iter().zip(&positions) {
                mapped[pos] = value.clone();
            }
            dataset.rows.push(mapped);
        }

        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn load_entities(&self) -> Result<Vec<EntityRow>> {
        let dataset = self.dataset(&self.report.entity_table).await?;

        let name_idx = column_index(&dataset, &self.report.name_column)?;
        let created_idx = column_index(&dataset, &self.report.created_at_column)?;
        let ref_idx = column_index(&dataset, &self.report.secondary_ref_column)?;

        let mut entities = Vec::with_capacity(dataset.rows.len());
        for row in &dataset.rows {
            let created_at = match row[created_idx].as_deref() {
                Some(raw) if !raw.is_empty() => parse_timestamp(raw)?,
                _ => {
                    return Err(FerryError::Config(format!(
                        "entity row is missing a {} value",
                        self.report.created_at_column
                    )))
                }
            };
            let secondary_id = match row[ref_idx].as_deref() {
                Some(raw) if !raw.is_empty() => Some(raw.parse::<i64>().map_err(|e| {
                    FerryError::Config(format!("invalid secondary reference {:?}: {}", raw, e))
                })?),
                _ => None,
            };
            entities.push(EntityRow {
                name: row[name_idx].clone().unwrap_or_default(),
                created_at,
                secondary_id,
            });
        }

        Ok(entities)
    }

    async fn load_secondary_keys(&self) -> Result<Vec<i64>> {
        let dataset = self.dataset(&self.report.secondary_table).await?;
        let key_idx = column_index(&dataset, &self.report.secondary_key_column)?;

        let mut keys = Vec::with_capacity(dataset.rows.len());
        for row in &dataset.rows {
            if let Some(raw) = row[key_idx].as_deref() {
                if !raw.is_empty() {
                    keys.push(raw.parse::<i64>().map_err(|e| {
                        FerryError::Config(format!("invalid secondary key {:?}: {}", raw, e))
                    })?);
                }
            }
        }

        Ok(keys)
    }
}

fn column_index(dataset: &Dataset, name: &str) -> Result<usize> {
    dataset
        .column_index(name)
        .ok_or_else(|| FerryError::MissingColumn(name.to_string()))
}

/// Parse a timestamp as RFC 3339, falling back to the bare
/// `YYYY-MM-DD HH:MM:SS` shape text-cast database values arrive in
/// (interpreted as UTC).
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    Err(FerryError::Config(format!(
        "cannot parse timestamp {:?}",
        raw
    )))
}
