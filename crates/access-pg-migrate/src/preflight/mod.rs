//! Pre-migration schema validation.
//!
//! Each table runs through the source, destination and mapping checks in
//! that order and stops at the first one that fails. A null scan over a
//! small sample follows and only ever produces warnings. Problems, including
//! failed catalog queries, are accumulated so one pass reports everything.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::TableSchema;
use crate::error::{MigrateError, Result};
use crate::mapping::{MappingCatalog, TableMapping};
use crate::source::SourcePool;
use crate::target::TargetPool;

/// Outcome of validating one table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableValidation {
    pub source_table: String,
    pub destination_table: String,
    pub source_ok: bool,
    pub destination_ok: bool,
    pub mapping_ok: bool,
    pub record_count: Option<i64>,

    /// Nulls seen per mapped source column in the sample.
    pub sample_nulls: BTreeMap<String, usize>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TableValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: String) {
        warn!("{}", message);
        self.errors.push(message);
    }

    fn warning(&mut self, message: String) {
        debug!("{}", message);
        self.warnings.push(message);
    }
}

/// Result of a validation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub error_count: usize,
    pub warning_count: usize,
    pub tables: BTreeMap<String, TableValidation>,
}

impl SchemaValidationReport {
    fn add(&mut self, table: TableValidation) {
        self.errors.extend(table.errors.iter().cloned());
        self.warnings.extend(table.warnings.iter().cloned());
        self.tables.insert(table.source_table.clone(), table);
    }

    fn finish(mut self) -> Self {
        self.error_count = self.errors.len();
        self.warning_count = self.warnings.len();
        self.valid = self.errors.is_empty();
        self
    }

    /// One-line description of the first few errors.
    pub fn error_summary(&self) -> String {
        let shown: Vec<&str> = self.errors.iter().take(3).map(String::as_str).collect();
        let mut summary = shown.join("; ");
        if self.errors.len() > shown.len() {
            summary.push_str(&format!(" (+{} more)", self.errors.len() - shown.len()));
        }
        summary
    }
}

/// Checks source and destination schemas against the mapping catalog.
pub struct SchemaValidator<'a> {
    source: &'a dyn SourcePool,
    target: &'a dyn TargetPool,
    catalog: &'a MappingCatalog,
    sample_size: usize,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(
        source: &'a dyn SourcePool,
        target: &'a dyn TargetPool,
        catalog: &'a MappingCatalog,
        sample_size: usize,
    ) -> Self {
        Self {
            source,
            target,
            catalog,
            sample_size,
        }
    }

    /// Both databases answer a catalog query.
    pub async fn validate_connections(&self) -> Result<()> {
        self.source.list_tables().await.map_err(|e| {
            MigrateError::connection(e.to_string(), format!("{} source", self.source.db_type()))
        })?;
        self.target.list_tables().await.map_err(|e| {
            MigrateError::connection(e.to_string(), format!("{} target", self.target.db_type()))
        })?;
        Ok(())
    }

    /// Validate the given source tables.
    pub async fn validate_tables(&self, tables: &[String]) -> SchemaValidationReport {
        let mut report = SchemaValidationReport::default();

        let source_tables = match self.source.list_tables().await {
            Ok(t) => t.into_iter().collect(),
            Err(e) => {
                report.errors.push(format!("Could not list source tables: {}", e));
                HashSet::new()
            }
        };
        let dest_tables = match self.target.list_tables().await {
            Ok(t) => t.into_iter().collect(),
            Err(e) => {
                report
                    .errors
                    .push(format!("Could not list destination tables: {}", e));
                HashSet::new()
            }
        };

        for table in tables {
            let result = self
                .validate_table(table, &source_tables, &dest_tables)
                .await;
            report.add(result);
        }

        let report = report.finish();
        if report.valid {
            info!(
                "Schema validation passed for {} table(s), {} warning(s)",
                tables.len(),
                report.warning_count
            );
        } else {
            warn!(
                "Schema validation failed: {} error(s), {} warning(s)",
                report.error_count, report.warning_count
            );
        }
        report
    }

    async fn validate_table(
        &self,
        source_table: &str,
        source_tables: &HashSet<String>,
        dest_tables: &HashSet<String>,
    ) -> TableValidation {
        let destination_table = self.catalog.destination_table_name(source_table);
        let mut result = TableValidation {
            source_table: source_table.to_string(),
            destination_table: destination_table.clone(),
            ..TableValidation::default()
        };

        let Some(mapping) = self.catalog.table(source_table) else {
            result.error(format!("No mapping defined for source table {}", source_table));
            return result;
        };

        let Some(source_schema) = self.check_source(mapping, source_tables, &mut result).await
        else {
            return result;
        };
        result.source_ok = true;

        let Some(dest_schema) = self.check_destination(mapping, dest_tables, &mut result).await
        else {
            return result;
        };
        result.destination_ok = true;

        if !check_mapping(mapping, &source_schema, &dest_schema, &mut result) {
            return result;
        }
        result.mapping_ok = true;

        if result.record_count.unwrap_or(0) > 0 {
            self.sample_nulls(mapping, &mut result).await;
        }
        result
    }

    async fn check_source(
        &self,
        mapping: &TableMapping,
        source_tables: &HashSet<String>,
        result: &mut TableValidation,
    ) -> Option<TableSchema> {
        let table = &mapping.source_table;
        if !source_tables.contains(table) {
            result.error(format!("Source table {} not found", table));
            return None;
        }

        let schema = match self.source.get_table_schema(table).await {
            Ok(schema) => schema,
            Err(e) => {
                result.error(format!("Error validating source table {}: {}", table, e));
                return None;
            }
        };
        let missing: Vec<&str> = mapping
            .source_columns()
            .into_iter()
            .filter(|c| !schema.has_column(c))
            .collect();
        if !missing.is_empty() {
            result.error(format!(
                "Source table {} is missing column(s): {}",
                table,
                missing.join(", ")
            ));
            return None;
        }

        match self.source.get_record_count(table).await {
            Ok(0) => {
                result.record_count = Some(0);
                result.warning(format!("Source table {} is empty", table));
            }
            Ok(count) => result.record_count = Some(count),
            Err(e) => result.warning(format!("Could not count records in {}: {}", table, e)),
        }
        Some(schema)
    }

    async fn check_destination(
        &self,
        mapping: &TableMapping,
        dest_tables: &HashSet<String>,
        result: &mut TableValidation,
    ) -> Option<TableSchema> {
        let table = &mapping.destination_table;
        if !dest_tables.contains(table) {
            result.error(format!(
                "Destination table {} does not exist; provision it first",
                table
            ));
            return None;
        }

        let schema = match self.target.get_table_schema(table).await {
            Ok(schema) => schema,
            Err(e) => {
                result.error(format!("Error validating destination table {}: {}", table, e));
                return None;
            }
        };
        let missing: Vec<&str> = self
            .catalog
            .required_destination_columns(table)
            .iter()
            .map(String::as_str)
            .filter(|c| !schema.has_column(c))
            .collect();
        if !missing.is_empty() {
            result.error(format!(
                "Destination table {} is missing required column(s): {}",
                table,
                missing.join(", ")
            ));
            return None;
        }
        Some(schema)
    }

    /// Advisory null scan over a small sample.
    async fn sample_nulls(&self, mapping: &TableMapping, result: &mut TableValidation) {
        let sample = match self
            .source
            .fetch_all(&mapping.source_table, Some(self.sample_size))
            .await
        {
            Ok(sample) => sample,
            Err(e) => {
                result.warning(format!(
                    "Could not sample {}: {}",
                    mapping.source_table, e
                ));
                return;
            }
        };

        for column in mapping.source_columns() {
            let nulls = sample
                .iter()
                .filter(|r| r.get(column).map_or(true, |v| v.is_null()))
                .count();
            if nulls > 0 {
                result.sample_nulls.insert(column.to_string(), nulls);
                result.warning(format!(
                    "{}.{}: {} of {} sampled record(s) are null",
                    mapping.source_table,
                    column,
                    nulls,
                    sample.len()
                ));
            }
        }
    }
}

/// Every mapped column exists on its side.
fn check_mapping(
    mapping: &TableMapping,
    source: &TableSchema,
    dest: &TableSchema,
    result: &mut TableValidation,
) -> bool {
    let mut ok = true;
    for field in &mapping.fields {
        if !source.has_column(&field.source) {
            result.error(format!(
                "Mapping {}.{} -> {}.{}: source column not found",
                mapping.source_table, field.source, mapping.destination_table, field.destination
            ));
            ok = false;
        }
        if !dest.has_column(&field.destination) {
            result.error(format!(
                "Mapping {}.{} -> {}.{}: destination column not found",
                mapping.source_table, field.source, mapping.destination_table, field.destination
            ));
            ok = false;
        }
    }

    for column in mapping.duplicate_destinations() {
        result.warning(format!(
            "{}.{} is mapped from more than one source column; the last one wins",
            mapping.destination_table, column
        ));
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AccessType, Column};

    fn schema(name: &str, cols: &[&str]) -> TableSchema {
        TableSchema::new(
            name,
            cols.iter()
                .map(|c| Column::access(*c, AccessType::Varchar, None))
                .collect(),
        )
    }

    #[test]
    fn test_check_mapping_reports_both_sides() {
        let mapping = TableMapping::new("Customers", "customers")
            .field("Customer", "name")
            .field("Person", "contact_person");
        let source = schema("Customers", &["Customer"]);
        let dest = schema("customers", &["id", "name"]);

        let mut result = TableValidation::default();
        assert!(!check_mapping(&mapping, &source, &dest, &mut result));
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("source column not found"));
        assert!(result.errors[1].contains("destination column not found"));
    }

    #[test]
    fn test_duplicate_destination_is_warning() {
        let mapping = TableMapping::new("Yarn_Types", "yarn_types")
            .field("Yarn_Type", "description")
            .field("Note", "description");
        let source = schema("Yarn_Types", &["Yarn_Type", "Note"]);
        let dest = schema("yarn_types", &["description"]);

        let mut result = TableValidation::default();
        assert!(check_mapping(&mapping, &source, &dest, &mut result));
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_report_counts() {
        let mut report = SchemaValidationReport::default();
        report.add(TableValidation {
            source_table: "A".into(),
            errors: vec!["e1".into(), "e2".into(), "e3".into(), "e4".into()],
            warnings: vec!["w".into()],
            ..TableValidation::default()
        });
        let report = report.finish();
        assert!(!report.valid);
        assert_eq!(report.error_count, 4);
        assert_eq!(report.warning_count, 1);
        assert_eq!(report.error_summary(), "e1; e2; e3 (+1 more)");
    }
}
