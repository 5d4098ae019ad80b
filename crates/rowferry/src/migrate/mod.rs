//! Migration orchestrator.
//!
//! Drives the two halves of a migration: export → encode → transfer-out, and
//! transfer-in → decode → bulk-load. The halves are individually idempotent
//! (every write overwrites) but not jointly transactional: a failure between
//! them leaves the remote file in place and the destination untouched or
//! partially loaded, and the remedy is a full re-run of the sequence.
//!
//! Nothing about a job is persisted; a retry after a crash or cancellation
//! starts from the beginning.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::info;

use crate::codec::{self, Dataset};
use crate::error::{FerryError, Result};
use crate::store::{DestStore, SourceStore};
use crate::transfer::{join_remote, FileTransfer};

/// One migration request. Ephemeral: exists only for the duration of a
/// single [`Migrator::run_job`] call.
#[derive(Debug, Clone)]
pub struct MigrationJob {
    /// Table to export from the source store.
    pub source_table: String,

    /// Local scratch file the CSV passes through.
    pub local_path: PathBuf,

    /// File name beneath the configured remote directory.
    pub remote_file: String,

    /// Table to bulk-load on the destination store.
    pub destination_table: String,
}

/// Result of an export-and-transfer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Exported table.
    pub table: String,

    /// Rows written to the file.
    pub rows: i64,

    /// Local file the table was encoded to.
    pub local_path: String,

    /// Remote path the file was uploaded to.
    pub remote_path: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,
}

/// Result of a download-and-import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Destination table.
    pub table: String,

    /// Rows bulk-loaded.
    pub rows: i64,

    /// Remote path the file was downloaded from.
    pub remote_path: String,

    /// Local file the download landed in.
    pub local_path: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,
}

/// Result of a full two-step migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub export: ExportSummary,
    pub import: ImportSummary,
}

/// Drives migrations between a source store and a destination store over a
/// file transfer channel.
pub struct Migrator {
    source: Arc<dyn SourceStore>,
    dest: Arc<dyn DestStore>,
    transfer: Arc<dyn FileTransfer>,
    remote_dir: String,
    batch_size: usize,
}

impl Migrator {
    pub fn new(
        source: Arc<dyn SourceStore>,
        dest: Arc<dyn DestStore>,
        transfer: Arc<dyn FileTransfer>,
        remote_dir: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            dest,
            transfer,
            remote_dir: remote_dir.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// Export a full table to `local_path` as CSV, then upload it beneath
    /// the configured remote directory under the file's base name.
    ///
    /// Rows stream through one at a time; the whole table is never held in
    /// memory. The cancellation signal is observed every batch of rows.
    pub async fn export_and_transfer(
        &self,
        table: &str,
        local_path: &Path,
        cancel: &watch::Receiver<bool>,
    ) -> Result<ExportSummary> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!("Starting export of {} (run {})", table, run_id);

        let mut scan = self.source.scan_table(table).await?;

        let file = tokio::fs::File::create(local_path).await?;
        let mut writer = tokio::io::BufWriter::new(file);

        let header = codec::encode_header(&scan.columns)?;
        writer.write_all(header.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        let mut rows: i64 = 0;
        while let Some(row) = scan.rows.recv().await {
            let row = row?;
            let line = codec::encode_record(&row)?;
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            rows += 1;

            if rows % self.batch_size as i64 == 0 && *cancel.borrow() {
                return Err(FerryError::Cancelled);
            }
        }
        writer.flush().await?;

        info!("Exported {} rows from {} to {}", rows, table, local_path.display());

        let remote_path = join_remote(&self.remote_dir, &file_name(local_path)?);
        self.transfer.upload(local_path, &remote_path).await?;
        info!("Uploaded {} to remote {}", local_path.display(), remote_path);

        Ok(ExportSummary {
            run_id,
            table: table.to_string(),
            rows,
            local_path: local_path.display().to_string(),
            remote_path,
            started_at,
            duration_seconds: elapsed_seconds(started_at),
        })
    }

    /// Download a remote file, decode it, and bulk-load it into
    /// `destination_table`, mapping every decoded column by name.
    ///
    /// A decoded column absent on the destination table is a configuration
    /// error surfaced to the caller, never silently dropped.
    pub async fn download_and_import(
        &self,
        remote_file: &str,
        local_path: &Path,
        destination_table: &str,
        cancel: &watch::Receiver<bool>,
    ) -> Result<ImportSummary> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        let remote_path = join_remote(&self.remote_dir, remote_file);
        info!(
            "Starting import of {} into {} (run {})",
            remote_path, destination_table, run_id
        );

        self.transfer.download(&remote_path, local_path).await?;
        info!("Downloaded remote {} to {}", remote_path, local_path.display());

        let text = tokio::fs::read_to_string(local_path).await?;
        let dataset = codec::decode(&text)?;

        self.check_destination_columns(destination_table, &dataset)
            .await?;

        let mut rows: i64 = 0;
        for batch in dataset.rows.chunks(self.batch_size) {
            if *cancel.borrow() {
                return Err(FerryError::Cancelled);
            }
            rows += self
                .dest
                .bulk_insert(destination_table, &dataset.columns, batch)
                .await? as i64;
        }

        info!(
            "Imported {} rows from {} into {}",
            rows,
            local_path.display(),
            destination_table
        );

        Ok(ImportSummary {
            run_id,
            table: destination_table.to_string(),
            rows,
            remote_path,
            local_path: local_path.display().to_string(),
            started_at,
            duration_seconds: elapsed_seconds(started_at),
        })
    }

    /// Run a full export → transfer → import job.
    pub async fn run_job(
        &self,
        job: &MigrationJob,
        cancel: &watch::Receiver<bool>,
    ) -> Result<MigrationSummary> {
        let export = self
            .export_and_transfer(&job.source_table, &job.local_path, cancel)
            .await?;
        let import = self
            .download_and_import(
                &job.remote_file,
                &job.local_path,
                &job.destination_table,
                cancel,
            )
            .await?;
        Ok(MigrationSummary { export, import })
    }

    async fn check_destination_columns(&self, table: &str, dataset: &Dataset) -> Result<()> {
        let dest_columns = self.dest.table_columns(table).await?;
        let missing: Vec<String> = dataset
            .columns
            .iter()
            .filter(|c| !dest_columns.contains(c))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(FerryError::ColumnMismatch {
                table: table.to_string(),
                missing,
            });
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            FerryError::Config(format!("local path {:?} has no file name", path))
        })
}

fn elapsed_seconds(started_at: DateTime<Utc>) -> f64 {
    (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0
}
