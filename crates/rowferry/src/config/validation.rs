//! Configuration validation.

use super::Config;
use crate::error::{FerryError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(FerryError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(FerryError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(FerryError::Config("source.user is required".into()));
    }

    // Destination validation
    if config.destination.host.is_empty() {
        return Err(FerryError::Config("destination.host is required".into()));
    }
    if config.destination.database.is_empty() {
        return Err(FerryError::Config("destination.database is required".into()));
    }
    if config.destination.user.is_empty() {
        return Err(FerryError::Config("destination.user is required".into()));
    }

    // Cannot migrate to the same database
    if config.source.host == config.destination.host
        && config.source.port == config.destination.port
        && config.source.database == config.destination.database
    {
        return Err(FerryError::Config(
            "source and destination cannot be the same database".into(),
        ));
    }

    // SFTP validation
    if config.sftp.host.is_empty() {
        return Err(FerryError::Config("sftp.host is required".into()));
    }
    if config.sftp.username.is_empty() {
        return Err(FerryError::Config("sftp.username is required".into()));
    }

    if config.source.pool_size == 0 || config.destination.pool_size == 0 {
        return Err(FerryError::Config("pool_size must be at least 1".into()));
    }
    if config.migration.batch_size == 0 {
        return Err(FerryError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if config.ledger.retention_days < 1 {
        return Err(FerryError::Config(
            "ledger.retention_days must be at least 1".into(),
        ));
    }
    if config.ledger.sweep_interval_secs == 0 {
        return Err(FerryError::Config(
            "ledger.sweep_interval_secs must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LedgerConfig, MigrationConfig, ReportConfig, SftpConfig, StoreConfig};

    fn valid_config() -> Config {
        Config {
            source: StoreConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "source_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: "public".to_string(),
                pool_size: 4,
            },
            destination: StoreConfig {
                host: "localhost".to_string(),
                port: 5433,
                database: "dest_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: "public".to_string(),
                pool_size: 4,
            },
            sftp: SftpConfig {
                host: "files.example.com".to_string(),
                port: 22,
                username: "ferry".to_string(),
                password: "password".to_string(),
                remote_dir: "/outbound".to_string(),
            },
            ledger: LedgerConfig::default(),
            migration: MigrationConfig::default(),
            report: ReportConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_sftp_host() {
        let mut config = valid_config();
        config.sftp.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_same_database_rejected() {
        let mut config = valid_config();
        config.destination.port = config.source.port;
        config.destination.database = config.source.database.clone();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_store_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_sftp_config_debug_redacts_password() {
        let mut config = valid_config();
        config.sftp.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.sftp);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_456"),
            "Debug output should not contain actual password value"
        );
    }
}
