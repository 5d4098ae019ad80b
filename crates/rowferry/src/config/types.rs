//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (exported tables are read here).
    pub source: StoreConfig,

    /// Destination database configuration (imported tables land here).
    pub destination: StoreConfig,

    /// SFTP endpoint the intermediate files travel over.
    pub sftp: SftpConfig,

    /// Idempotency ledger configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Report engine table/column names.
    #[serde(default)]
    pub report: ReportConfig,
}

/// PostgreSQL store configuration.
///
/// Used for both the source and destination stores; the two are independently
/// configured and never share a pool.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// Connection pool size (default: 4).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// SFTP endpoint configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SftpConfig {
    /// SFTP host.
    pub host: String,

    /// SFTP port (default: 22).
    #[serde(default = "default_sftp_port")]
    pub port: u16,

    /// Username.
    pub username: String,

    /// Password.
    pub password: String,

    /// Base remote directory all transfer paths are joined beneath
    /// (default: "/").
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,
}

impl std::fmt::Debug for SftpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SftpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("remote_dir", &self.remote_dir)
            .finish()
    }
}

/// Idempotency ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Days a record is retained before the sweep removes it (default: 7).
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Seconds between retention sweeps (default: 86400, once per day).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per bulk-load batch; also the cancellation check granularity
    /// (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Table and column names the report engine queries.
///
/// These flow into query construction verbatim; they are expected to be
/// operator-controlled configuration, not end-user input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Entity table (default: "users").
    #[serde(default = "default_entity_table")]
    pub entity_table: String,

    /// Secondary entity table (default: "cars").
    #[serde(default = "default_secondary_table")]
    pub secondary_table: String,

    /// Entity name column, also the header matched in CSV reports
    /// (default: "name").
    #[serde(default = "default_name_column")]
    pub name_column: String,

    /// Entity creation timestamp column (default: "created_at").
    #[serde(default = "default_created_at_column")]
    pub created_at_column: String,

    /// Entity foreign-key column referencing the secondary table
    /// (default: "car_id").
    #[serde(default = "default_secondary_ref_column")]
    pub secondary_ref_column: String,

    /// Secondary table key column (default: "id").
    #[serde(default = "default_secondary_key_column")]
    pub secondary_key_column: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            entity_table: default_entity_table(),
            secondary_table: default_secondary_table(),
            name_column: default_name_column(),
            created_at_column: default_created_at_column(),
            secondary_ref_column: default_secondary_ref_column(),
            secondary_key_column: default_secondary_key_column(),
        }
    }
}

// Default value functions for serde

fn default_pg_port() -> u16 {
    5432
}

fn default_sftp_port() -> u16 {
    22
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_pool_size() -> usize {
    4
}

fn default_remote_dir() -> String {
    "/".to_string()
}

fn default_retention_days() -> i64 {
    7
}

fn default_sweep_interval_secs() -> u64 {
    86_400
}

fn default_batch_size() -> usize {
    1000
}

fn default_entity_table() -> String {
    "users".to_string()
}

fn default_secondary_table() -> String {
    "cars".to_string()
}

fn default_name_column() -> String {
    "name".to_string()
}

fn default_created_at_column() -> String {
    "created_at".to_string()
}

fn default_secondary_ref_column() -> String {
    "car_id".to_string()
}

fn default_secondary_key_column() -> String {
    "id".to_string()
}
