//! # rowferry
//!
//! Table migration between two independent PostgreSQL stores over SFTP, with
//! an idempotency ledger and an aggregate report engine.
//!
//! The library covers:
//!
//! - **Quoted-CSV codec** for the intermediate tabular files
//! - **SFTP transfer** with replace-on-upload idempotency
//! - **Migration orchestration**: export → transfer and download → bulk-load
//! - **Idempotency ledger** with storage-level first-writer-wins semantics
//!   and a background retention sweep
//! - **Aggregate reports** computed against the live store or a CSV snapshot
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rowferry::{Config, Migrator, PgStore, SftpTransfer};
//!
//! #[tokio::main]
//! async fn main() -> rowferry::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let source = Arc::new(PgStore::connect(&config.source, config.report.clone()).await?);
//!     let dest = Arc::new(PgStore::connect(&config.destination, config.report.clone()).await?);
//!     let transfer = Arc::new(SftpTransfer::new(config.sftp.clone()));
//!
//!     let migrator = Migrator::new(
//!         source,
//!         dest,
//!         transfer,
//!         config.sftp.remote_dir.clone(),
//!         config.migration.batch_size,
//!     );
//!
//!     let (_cancel_tx, cancel) = tokio::sync::watch::channel(false);
//!     let summary = migrator
//!         .export_and_transfer("users", std::path::Path::new("/tmp/users.csv"), &cancel)
//!         .await?;
//!     println!("Exported {} rows", summary.rows);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod ledger;
pub mod migrate;
pub mod report;
pub mod store;
pub mod transfer;

// Re-exports for convenient access
pub use codec::Dataset;
pub use config::{Config, LedgerConfig, MigrationConfig, ReportConfig, SftpConfig, StoreConfig};
pub use error::{ErrorCategory, FerryError, Result};
pub use ledger::{IdempotencyLedger, LedgerRecord, MemoryLedger, PgLedger, RetentionSweeper};
pub use migrate::{ExportSummary, ImportSummary, MigrationJob, MigrationSummary, Migrator};
pub use report::ReportEngine;
pub use store::{EntityRow, MemoryStore, PgStore};
pub use transfer::{FileTransfer, LocalDirTransfer, SftpTransfer};
