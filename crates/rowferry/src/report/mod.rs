//! Aggregate report engine.
//!
//! Binds the pure aggregate functions to row providers: the live entity
//! store for the standard reports, and downloaded CSV snapshots for the
//! no-import variant. The chained migrate-then-report operation adds no
//! logic of its own beyond sequencing a migration before the aggregate.

pub mod aggregates;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::codec;
use crate::error::Result;
use crate::migrate::{MigrationJob, MigrationSummary, Migrator};
use crate::store::EntityStore;
use crate::transfer::{join_remote, FileTransfer};

/// Result of a migrate-then-duplicates run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MigrateReport {
    /// The migration that preceded the aggregate.
    pub migration: MigrationSummary,

    /// Duplicate names computed against the freshly loaded destination table.
    pub duplicates: Vec<String>,
}

/// Read-side report computations over the destination store and over CSV
/// snapshots.
pub struct ReportEngine {
    entities: Arc<dyn EntityStore>,
    migrator: Arc<Migrator>,
    transfer: Arc<dyn FileTransfer>,
    remote_dir: String,
    name_column: String,
}

impl ReportEngine {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        migrator: Arc<Migrator>,
        transfer: Arc<dyn FileTransfer>,
        remote_dir: impl Into<String>,
        name_column: impl Into<String>,
    ) -> Self {
        Self {
            entities,
            migrator,
            transfer,
            remote_dir: remote_dir.into(),
            name_column: name_column.into(),
        }
    }

    /// Distinct names from the calendar month of the most recent entity.
    pub async fn latest_cohort_names(&self) -> Result<Vec<String>> {
        let rows = self.entities.load_entities().await?;
        aggregates::latest_cohort_names(&rows)
    }

    /// Names held by more than one entity.
    pub async fn duplicate_names(&self) -> Result<Vec<String>> {
        let rows = self.entities.load_entities().await?;
        Ok(aggregates::duplicate_names(rows.iter().map(|r| r.name.as_str())))
    }

    /// Entities whose secondary reference matches an existing secondary key.
    pub async fn count_matched_entities(&self) -> Result<usize> {
        let rows = self.entities.load_entities().await?;
        let keys = self.entities.load_secondary_keys().await?;
        Ok(aggregates::count_matched_entities(&rows, &keys))
    }

    /// Secondary entities no entity references.
    pub async fn count_unreferenced_secondaries(&self) -> Result<usize> {
        let rows = self.entities.load_entities().await?;
        let keys = self.entities.load_secondary_keys().await?;
        Ok(aggregates::count_unreferenced_secondaries(&rows, &keys))
    }

    /// Run a full migration, then compute duplicate names against the
    /// destination store's freshly loaded table.
    pub async fn migrate_then_duplicates(
        &self,
        job: &MigrationJob,
        cancel: &watch::Receiver<bool>,
    ) -> Result<MigrateReport> {
        let migration = self.migrator.run_job(job, cancel).await?;
        let duplicates = self.duplicate_names().await?;

        info!(
            "Migrate-then-duplicates on {}: {} duplicate names",
            job.source_table,
            duplicates.len()
        );
        Ok(MigrateReport {
            migration,
            duplicates,
        })
    }

    /// Download a remote CSV (no import) and compute duplicate names from
    /// its name column.
    pub async fn csv_duplicate_names(
        &self,
        remote_file: &str,
        local_path: &Path,
    ) -> Result<Vec<String>> {
        let remote_path = join_remote(&self.remote_dir, remote_file);
        self.transfer.download(&remote_path, local_path).await?;

        let text = tokio::fs::read_to_string(local_path).await?;
        let dataset = codec::decode(&text)?;
        let duplicates = aggregates::csv_name_duplicates(&dataset, &self.name_column)?;

        info!(
            "CSV-duplicates on {}: {} duplicate names",
            remote_path,
            duplicates.len()
        );
        Ok(duplicates)
    }
}
