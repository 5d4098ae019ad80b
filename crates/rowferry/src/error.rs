//! Error types for the migration and ledger library.

use thiserror::Error;

/// Main error type for ledger, migration and report operations.
#[derive(Error, Debug)]
pub enum FerryError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query error (source, destination or ledger store)
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Missing or empty idempotency key on an idempotent-sensitive operation
    #[error("Missing or empty idempotency key for operation {0}")]
    InvalidKey(String),

    /// A required column is absent from a decoded dataset
    #[error("Dataset does not contain a {0} column")]
    MissingColumn(String),

    /// Decoded columns that do not exist on the destination table
    #[error("Table {table} is missing columns present in the dataset: {}", .missing.join(", "))]
    ColumnMismatch { table: String, missing: Vec<String> },

    /// Input that cannot be encoded to or decoded from the tabular format
    #[error("Malformed tabular data: {0}")]
    MalformedCsv(String),

    /// Remote file or referenced resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cannot connect or authenticate to the transfer endpoint
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Idempotency key reused for a different recorded outcome
    #[error(
        "Idempotency key {key:?} for operation {operation} already maps to resource {existing}, refusing to record resource {attempted}"
    )]
    Consistency {
        key: String,
        operation: String,
        existing: i64,
        attempted: i64,
    },

    /// Aggregate requested over an empty entity set
    #[error("Cannot compute aggregate over an empty dataset")]
    EmptyDataset,

    /// Operation was cancelled (SIGINT, etc.)
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error category exposed at the boundary.
///
/// External callers see the category and a category-safe message; raw driver
/// detail stays in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller supplied bad input; the message is safe to surface.
    Client,
    /// The addressed file or resource does not exist.
    NotFound,
    /// The transfer endpoint is unreachable or rejected authentication.
    Transport,
    /// An idempotency record conflicts with the attempted outcome.
    Consistency,
    /// The operation was cancelled before completion.
    Cancelled,
    /// Everything else; surfaced as a generic server error.
    Internal,
}

impl FerryError {
    /// Create a Pool error with context about where it occurred.
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        FerryError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        FerryError::Transport(message.into())
    }

    /// Classify this error into its boundary category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FerryError::Config(_)
            | FerryError::InvalidKey(_)
            | FerryError::MissingColumn(_)
            | FerryError::ColumnMismatch { .. }
            | FerryError::MalformedCsv(_)
            | FerryError::EmptyDataset => ErrorCategory::Client,
            FerryError::NotFound(_) => ErrorCategory::NotFound,
            FerryError::Transport(_) => ErrorCategory::Transport,
            FerryError::Consistency { .. } => ErrorCategory::Consistency,
            FerryError::Cancelled => ErrorCategory::Cancelled,
            FerryError::Db(_)
            | FerryError::Pool { .. }
            | FerryError::Io(_)
            | FerryError::Yaml(_)
            | FerryError::Json(_) => ErrorCategory::Internal,
        }
    }

    /// Message safe to return to an external caller.
    ///
    /// Internal errors are collapsed to a generic message so storage-layer
    /// detail never leaks past the boundary.
    pub fn public_message(&self) -> String {
        match self.category() {
            ErrorCategory::Internal => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Process exit code for the CLI boundary.
    pub fn exit_code(&self) -> u8 {
        match self.category() {
            ErrorCategory::Internal => 1,
            ErrorCategory::Client => 2,
            ErrorCategory::NotFound => 3,
            ErrorCategory::Transport => 4,
            ErrorCategory::Consistency => 5,
            ErrorCategory::Cancelled => 130,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, FerryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_do_not_leak() {
        let err = FerryError::pool("connection refused by backend", "ledger store");
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert_eq!(err.public_message(), "internal server error");
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let err = FerryError::MissingColumn("Name".into());
        assert_eq!(err.category(), ErrorCategory::Client);
        assert!(err.public_message().contains("Name"));
    }

    #[test]
    fn test_not_found_is_distinct_from_transport() {
        let missing = FerryError::NotFound("/outbound/users.csv".into());
        let down = FerryError::transport("connection refused");
        assert_eq!(missing.category(), ErrorCategory::NotFound);
        assert_eq!(down.category(), ErrorCategory::Transport);
        assert_ne!(missing.exit_code(), down.exit_code());
    }
}
