//! PostgreSQL store implementation.
//!
//! Uses deadpool-postgres for connection pooling. Scans read every column as
//! text so the rows can flow straight into the tabular codec; bulk loads use
//! the text-format COPY protocol.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info};

use super::{quote_ident, DestStore, EntityRow, EntityStore, RowStream, SourceStore};
use crate::config::{ReportConfig, StoreConfig};
use crate::error::{FerryError, Result};

/// Build a connection pool for a store.
pub fn build_pool(config: &StoreConfig) -> Result<Pool> {
    let mut pg_config = PgConfig::new();
    pg_config.host(&config.host);
    pg_config.port(config.port);
    pg_config.dbname(&config.database);
    pg_config.user(&config.user);
    pg_config.password(&config.password);

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
    Pool::builder(mgr)
        .max_size(config.pool_size)
        .build()
        .map_err(|e| FerryError::pool(e.to_string(), "creating PostgreSQL pool"))
}

/// PostgreSQL store. One instance serves whichever of the narrow store
/// traits the caller needs; source and destination get separate instances
/// built from their own configuration.
pub struct PgStore {
    pool: Pool,
    schema: String,
    report: ReportConfig,
}

impl PgStore {
    /// Build a pool from configuration and verify it with a smoke query.
    pub async fn connect(config: &StoreConfig, report: ReportConfig) -> Result<Self> {
        let pool = build_pool(config)?;

        let client = pool
            .get()
            .await
            .map_err(|e| FerryError::pool(e.to_string(), "testing PostgreSQL connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL store: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            schema: config.schema.clone(),
            report,
        })
    }

    async fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| FerryError::pool(e.to_string(), "getting connection for column listing"))?;

        let query = r#"
            SELECT column_name
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = client.query(query, &[&self.schema, &table]).await?;
        let columns: Vec<String> = rows.iter().map(|r| r.get::<_, String>(0)).collect();

        if columns.is_empty() {
            return Err(FerryError::NotFound(format!(
                "table {}.{} does not exist or has no columns",
                self.schema, table
            )));
        }

        debug!("Loaded {} columns for {}.{}", columns.len(), self.schema, table);
        Ok(columns)
    }
}

#[async_trait]
impl SourceStore for PgStore {
    async fn scan_table(&self, table: &str) -> Result<RowStream> {
        let columns = self.column_names(table).await?;

        let col_list = columns
            .iter()
            .map(|c| format!("{}::text", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {}.{}",
            col_list,
            quote_ident(&self.schema),
            quote_ident(table)
        );

        let (tx, rx) = mpsc::channel(16);
        let pool = self.pool.clone();
        let ncols = columns.len();

        tokio::spawn(async move {
            if let Err(e) = scan_internal(pool, sql, ncols, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(RowStream { columns, rows: rx })
    }
}

async fn scan_internal(
    pool: Pool,
    sql: String,
    ncols: usize,
    tx: mpsc::Sender<Result<Vec<Option<String>>>>,
) -> Result<()> {
    let client = pool
        .get()
        .await
        .map_err(|e| FerryError::pool(e.to_string(), "getting connection for table scan"))?;

    let row_stream = client.query_raw(&sql, Vec::<String>::new()).await?;
    tokio::pin!(row_stream);

    while let Some(row) = row_stream.next().await {
        let row = row?;
        let mut values = Vec::with_capacity(ncols);
        for idx in 0..ncols {
            values.push(row.try_get::<_, Option<String>>(idx)?);
        }
        if tx.send(Ok(values)).await.is_err() {
            // Receiver dropped; the scan was abandoned.
            return Ok(());
        }
    }

    Ok(())
}

#[async_trait]
impl DestStore for PgStore {
    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        self.column_names(table).await
    }

    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| FerryError::pool(e.to_string(), "getting connection for bulk insert"))?;

        let col_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let copy_sql = format!(
            "COPY {}.{} ({}) FROM STDIN WITH (FORMAT TEXT)",
            quote_ident(&self.schema),
            quote_ident(table),
            col_list.join(", ")
        );

        let sink = client.copy_in(&copy_sql).await?;
        tokio::pin!(sink);

        let mut text = String::with_capacity(rows.len() * 64);
        for row in rows {
            for (idx, value) in row.iter().enumerate() {
                if idx > 0 {
                    text.push('\t');
                }
                match value {
                    Some(v) => text.push_str(&escape_copy_text(v)),
                    None => text.push_str("\\N"),
                }
            }
            text.push('\n');
        }

        sink.send(Bytes::from(text)).await?;
        let copied = sink.finish().await?;

        debug!("Bulk loaded {} rows into {}.{}", copied, self.schema, table);
        Ok(copied)
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn load_entities(&self) -> Result<Vec<EntityRow>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| FerryError::pool(e.to_string(), "getting connection for entity rows"))?;

        let sql = format!(
            "SELECT {}::text, {}::timestamptz, {}::int8 FROM {}.{}",
            quote_ident(&self.report.name_column),
            quote_ident(&self.report.created_at_column),
            quote_ident(&self.report.secondary_ref_column),
            quote_ident(&self.schema),
            quote_ident(&self.report.entity_table)
        );

        let rows = client.query(&sql, &[]).await?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            entities.push(EntityRow {
                name: row.try_get::<_, Option<String>>(0)?.unwrap_or_default(),
                created_at: row.try_get::<_, DateTime<Utc>>(1)?,
                secondary_id: row.try_get::<_, Option<i64>>(2)?,
            });
        }

        Ok(entities)
    }

    async fn load_secondary_keys(&self) -> Result<Vec<i64>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| FerryError::pool(e.to_string(), "getting connection for secondary keys"))?;

        let sql = format!(
            "SELECT {}::int8 FROM {}.{}",
            quote_ident(&self.report.secondary_key_column),
            quote_ident(&self.schema),
            quote_ident(&self.report.secondary_table)
        );

        let rows = client.query(&sql, &[]).await?;
        Ok(rows.iter().map(|r| r.get::<_, i64>(0)).collect())
    }
}

/// Escape text for PostgreSQL COPY.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_copy_text() {
        assert_eq!(escape_copy_text("hello"), "hello");
        assert_eq!(escape_copy_text("tab\there"), "tab\\there");
        assert_eq!(escape_copy_text("new\nline"), "new\\nline");
        assert_eq!(escape_copy_text("back\\slash"), "back\\\\slash");
    }
}
