//! Narrow store interfaces the migration and report engines consume.
//!
//! The source and destination stores are independent services addressed by
//! separate connection configurations; they share interface shape, not
//! connections. [`PgStore`] is the PostgreSQL implementation of all three
//! traits; [`MemoryStore`] backs tests and offline development.
//!
//! Table and column names reaching these traits are assumed to be validated
//! by the calling layer (operator configuration or an allow-listing router).
//! Identifiers are quote-escaped when spliced into SQL, but no allow-listing
//! happens here.

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::{build_pool, PgStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::Result;

/// One entity row as the report engine sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    /// Entity name.
    pub name: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Foreign key into the secondary table, if set.
    pub secondary_id: Option<i64>,
}

/// A full-table scan: column names up front, rows delivered through a
/// bounded channel so large tables never sit in memory whole.
pub struct RowStream {
    /// Column names in table order.
    pub columns: Vec<String>,

    /// Row values as text, positionally matching `columns`. `None` is NULL.
    pub rows: mpsc::Receiver<Result<Vec<Option<String>>>>,
}

/// Read side of a migration: full-table scans from the source store.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Start a full-table scan, returning every column as text.
    async fn scan_table(&self, table: &str) -> Result<RowStream>;
}

/// Write side of a migration: bulk loads into the destination store.
#[async_trait]
pub trait DestStore: Send + Sync {
    /// Column names of a destination table, in ordinal order.
    async fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Append a batch of rows, mapping each value to the named column.
    async fn bulk_insert(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
    ) -> Result<u64>;
}

/// Read side of the report engine.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Every entity row (name, creation timestamp, secondary reference).
    async fn load_entities(&self) -> Result<Vec<EntityRow>>;

    /// Every key present in the secondary table.
    async fn load_secondary_keys(&self) -> Result<Vec<i64>>;
}

/// Quote a PostgreSQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("user\"table"), "\"user\"\"table\"");
    }
}
