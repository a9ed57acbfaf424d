//! Source schema inspection reports.
//!
//! Writes `access-schema.json` (columns, record count and a few sample
//! records per table) and a plain-text `schema-summary.txt` to an output
//! directory. Only the source database is touched.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::core::{Column, Record};
use crate::error::Result;
use crate::source::SourcePool;

/// Sample records kept per table.
pub const SAMPLE_RECORDS: usize = 5;

pub const SCHEMA_FILE: &str = "access-schema.json";
pub const SUMMARY_FILE: &str = "schema-summary.txt";

/// Inspection result for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableInspection {
    pub columns: Vec<Column>,
    pub record_count: i64,
    pub sample_records: Vec<Record>,
}

/// Inspection result for the whole database, keyed by table name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaInspection {
    pub tables: BTreeMap<String, TableInspection>,
}

impl SchemaInspection {
    /// Human-readable summary, one block per table.
    pub fn summary_text(&self) -> String {
        let mut out = String::new();
        out.push_str("ACCESS DATABASE SCHEMA SUMMARY\n");
        out.push_str(&"=".repeat(50));
        out.push_str("\n\n");

        for (name, table) in &self.tables {
            let _ = writeln!(out, "Table: {}", name);
            let _ = writeln!(out, "Records: {}", table.record_count);
            out.push_str("Columns:\n");
            for col in &table.columns {
                let _ = writeln!(
                    out,
                    "  - {}: {} {}",
                    col.name,
                    col.type_display(),
                    if col.nullable { "NULL" } else { "NOT NULL" }
                );
            }
            out.push('\n');
        }
        out
    }
}

/// Paths written by [`inspect_database`].
#[derive(Debug, Clone)]
pub struct InspectionOutput {
    pub schema_file: PathBuf,
    pub summary_file: PathBuf,
    pub inspection: SchemaInspection,
}

/// Inspect every user table and write both reports under `output_dir`.
pub async fn inspect_database(
    source: &dyn SourcePool,
    output_dir: impl AsRef<Path>,
) -> Result<InspectionOutput> {
    let output_dir = output_dir.as_ref();
    let inspection = collect(source).await?;

    std::fs::create_dir_all(output_dir)?;
    let schema_file = output_dir.join(SCHEMA_FILE);
    std::fs::write(&schema_file, serde_json::to_string_pretty(&inspection.tables)?)?;
    let summary_file = output_dir.join(SUMMARY_FILE);
    std::fs::write(&summary_file, inspection.summary_text())?;

    info!(
        "Inspected {} table(s); reports written to {}",
        inspection.tables.len(),
        output_dir.display()
    );
    Ok(InspectionOutput {
        schema_file,
        summary_file,
        inspection,
    })
}

async fn collect(source: &dyn SourcePool) -> Result<SchemaInspection> {
    let mut inspection = SchemaInspection::default();
    for table in source.list_tables().await? {
        info!("Inspecting {}", table);
        let schema = source.get_table_schema(&table).await?;
        let record_count = source.get_record_count(&table).await?;
        let sample_records = if record_count > 0 {
            source
                .fetch_all(&table, Some(SAMPLE_RECORDS))
                .await
                .unwrap_or_else(|e| {
                    warn!("Could not sample {}: {}", table, e);
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        inspection.tables.insert(
            table,
            TableInspection {
                columns: schema.columns,
                record_count,
                sample_records,
            },
        );
    }
    Ok(inspection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AccessType, SqlValue, TableSchema};
    use async_trait::async_trait;

    struct FixedSource;

    #[async_trait]
    impl SourcePool for FixedSource {
        async fn list_tables(&self) -> Result<Vec<String>> {
            Ok(vec!["Customers".into(), "Empty".into()])
        }

        async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
            Ok(TableSchema::new(
                table,
                vec![
                    Column::access("Customer", AccessType::Varchar, Some(50)),
                    Column::access("Entered", AccessType::DateTime, None),
                ],
            ))
        }

        async fn get_record_count(&self, table: &str) -> Result<i64> {
            Ok(if table == "Customers" { 7 } else { 0 })
        }

        async fn fetch_all(&self, _table: &str, limit: Option<usize>) -> Result<Vec<Record>> {
            let n = limit.unwrap_or(7).min(7);
            Ok((0..n)
                .map(|i| {
                    let mut r = Record::new();
                    r.insert("Customer".into(), SqlValue::Text(format!("C{}", i)));
                    r
                })
                .collect())
        }

        fn db_type(&self) -> &str {
            "fixed"
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn test_inspect_writes_reports() {
        let dir = tempfile::tempdir().unwrap();
        let out = inspect_database(&FixedSource, dir.path().join("reports"))
            .await
            .unwrap();

        let customers = &out.inspection.tables["Customers"];
        assert_eq!(customers.record_count, 7);
        assert_eq!(customers.sample_records.len(), SAMPLE_RECORDS);
        assert!(out.inspection.tables["Empty"].sample_records.is_empty());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out.schema_file).unwrap()).unwrap();
        assert_eq!(json["Customers"]["record_count"], 7);
        assert_eq!(json["Customers"]["columns"][0]["type"], "VARCHAR");

        let summary = std::fs::read_to_string(&out.summary_file).unwrap();
        assert!(summary.contains("Table: Customers"));
        assert!(summary.contains("Records: 7"));
        assert!(summary.contains("  - Customer: VARCHAR(50) NULL"));
        assert!(summary.contains("  - Entered: DATETIME NULL"));
    }
}
