//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Access database settings.
    pub source: SourceConfig,

    /// PostgreSQL settings.
    pub target: TargetConfig,

    /// Migration behavior.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Validation behavior.
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// How the Access database is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBackend {
    /// ODBC when compiled in, otherwise mdbtools.
    #[default]
    Auto,
    Odbc,
    Mdbtools,
}

/// Access database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the .mdb / .accdb file.
    pub path: String,

    #[serde(default)]
    pub backend: SourceBackend,
}

/// Target database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// libpq-style connection string; overrides the fields above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Destination tables to migrate. Empty means all mapped tables.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Records per progress batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Fail a table on its first record error.
    #[serde(default)]
    pub strict_mode: bool,

    /// Transform and validate without writing.
    #[serde(default)]
    pub dry_run: bool,

    /// Re-migrate tables already marked completed.
    #[serde(default)]
    pub force: bool,

    /// Path of the JSON state file.
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            batch_size: default_batch_size(),
            strict_mode: false,
            dry_run: false,
            force: false,
            state_file: default_state_file(),
        }
    }
}

/// Validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Run the pre-flight schema validator before migrating.
    #[serde(default = "default_true")]
    pub check_schema: bool,

    /// Records sampled per table by the validators.
    #[serde(default = "default_sample_records")]
    pub sample_records: usize,

    /// Where the post-migration report is written.
    #[serde(default = "default_report_file")]
    pub report_file: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            check_schema: true,
            sample_records: default_sample_records(),
            report_file: default_report_file(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_state_file() -> String {
    "migration-state.json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sample_records() -> usize {
    10
}

fn default_report_file() -> String {
    "reports/validation-report.json".to_string()
}
