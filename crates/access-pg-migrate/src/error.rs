//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration, YAML and JSON errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code when the source or target cannot be reached.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code when pre-flight schema validation fails.
pub const EXIT_SCHEMA_ERROR: u8 = 3;
/// Exit code when a table migration fails fatally.
pub const EXIT_TRANSFER_ERROR: u8 = 4;
/// Exit code for state file errors.
pub const EXIT_STATE_ERROR: u8 = 5;
/// Exit code when post-migration validation fails.
pub const EXIT_VALIDATION_ERROR: u8 = 6;
/// Exit code for filesystem errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or target could not be reached
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Access database read error (driver or extraction tool)
    #[error("Source database error: {0}")]
    Source(String),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Target statement rejected for a reason other than a unique violation
    #[error("Statement failed: {0}")]
    Statement(String),

    /// Insert hit an existing row under a unique constraint
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Pre-flight schema validation failed
    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Post-migration validation failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// State file error
    #[error("State file error: {0}")]
    State(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV parse error from extraction tool output
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// True when the error is a unique-constraint collision on insert.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, MigrateError::DuplicateKey(_))
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::SchemaValidation(_) => EXIT_SCHEMA_ERROR,
            MigrateError::Transfer { .. } => EXIT_TRANSFER_ERROR,
            MigrateError::State(_) => EXIT_STATE_ERROR,
            MigrateError::Validation(_) => EXIT_VALIDATION_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            _ => EXIT_CONFIG_ERROR,
        }
    }

    /// Format error with full details including error chain
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

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
