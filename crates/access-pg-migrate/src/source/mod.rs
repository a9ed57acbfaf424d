//! Access database readers.
//!
//! Two interchangeable backends implement [`SourcePool`]:
//! - [`MdbToolsSource`]: shells out to the mdbtools command-line utilities
//! - `OdbcAccessPool` (feature `odbc`): reads through an Access ODBC driver
//!
//! Both exclude the same system tables and infer column types through
//! [`AccessType::from_declared`], so callers cannot tell them apart.

mod mdbtools;
#[cfg(feature = "odbc")]
mod odbc;

pub use mdbtools::MdbToolsSource;
#[cfg(feature = "odbc")]
pub use odbc::OdbcAccessPool;

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::{SourceBackend, SourceConfig};
use crate::core::{AccessType, Record, SqlValue, TableSchema};
use crate::error::{MigrateError, Result};

/// Read access to the legacy database.
#[async_trait]
pub trait SourcePool: Send + Sync {
    /// User tables, excluding Access system tables.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Column metadata for a table. Empty when the table cannot be described.
    async fn get_table_schema(&self, table: &str) -> Result<TableSchema>;

    /// Number of records in a table.
    async fn get_record_count(&self, table: &str) -> Result<i64>;

    /// All records of a table, or the first `limit` records.
    async fn fetch_all(&self, table: &str, limit: Option<usize>) -> Result<Vec<Record>>;

    /// Backend name for logging.
    fn db_type(&self) -> &str;

    /// Release held resources.
    async fn close(&self);
}

/// Access system and temporary tables.
pub fn is_system_table(name: &str) -> bool {
    name.starts_with("MSys") || name.starts_with('~')
}

/// Timestamp layouts emitted by mdb-export (old and new defaults) and ODBC drivers.
const SOURCE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Convert a cell read as text into a typed value for its column type.
///
/// Empty cells are null. Cells that do not parse as their declared type are
/// kept as text and left to the column's transform.
pub fn convert_text_value(text: &str, access_type: AccessType) -> SqlValue {
    if text.is_empty() {
        return SqlValue::Null;
    }

    let trimmed = text.trim();
    let converted = match access_type {
        AccessType::Varchar => None,
        AccessType::Integer => trimmed.parse::<i64>().ok().map(SqlValue::Int),
        AccessType::Decimal => Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .ok()
            .map(SqlValue::Decimal),
        AccessType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "1" | "-1" | "true" | "yes" => Some(SqlValue::Bool(true)),
            "0" | "false" | "no" => Some(SqlValue::Bool(false)),
            _ => None,
        },
        AccessType::DateTime => parse_source_timestamp(trimmed),
    };

    converted.unwrap_or_else(|| SqlValue::Text(text.to_string()))
}

fn parse_source_timestamp(text: &str) -> Option<SqlValue> {
    for fmt in SOURCE_TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(SqlValue::DateTime(dt));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(SqlValue::DateTime)
}

/// Open the Access database with the configured backend.
///
/// `auto` prefers the ODBC driver when compiled in and falls back to mdbtools.
pub async fn connect(config: &SourceConfig) -> Result<Box<dyn SourcePool>> {
    let path = Path::new(&config.path);
    if !path.exists() {
        return Err(MigrateError::connection(
            format!("Access database not found: {}", config.path),
            "source",
        ));
    }

    match config.backend {
        SourceBackend::Odbc => connect_odbc(path).await,
        SourceBackend::Mdbtools => Ok(Box::new(MdbToolsSource::new(path).await?)),
        SourceBackend::Auto => {
            match connect_odbc(path).await {
                Ok(pool) => return Ok(pool),
                Err(e) => info!("ODBC unavailable ({}), trying mdbtools", e),
            }
            match MdbToolsSource::new(path).await {
                Ok(source) => Ok(Box::new(source)),
                Err(e) => {
                    warn!("mdbtools unavailable: {}", e);
                    Err(MigrateError::connection(
                        "No Access reader available",
                        "install mdbtools (apt-get install mdbtools / brew install mdbtools) \
                         or build with the `odbc` feature and an Access ODBC driver",
                    ))
                }
            }
        }
    }
}

#[cfg(feature = "odbc")]
async fn connect_odbc(path: &Path) -> Result<Box<dyn SourcePool>> {
    Ok(Box::new(OdbcAccessPool::new(path)?))
}

#[cfg(not(feature = "odbc"))]
async fn connect_odbc(_path: &Path) -> Result<Box<dyn SourcePool>> {
    Err(MigrateError::connection(
        "ODBC support not compiled in",
        "rebuild with --features odbc",
    ))
}
