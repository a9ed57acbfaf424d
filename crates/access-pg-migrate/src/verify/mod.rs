//! Post-migration verification.
//!
//! Runs independently of the migration: it compares source and destination
//! counts, checks the shape of a small sample from each side, counts orphaned
//! foreign key values and looks for nulls in required destination columns.
//! Nothing is repaired; findings go into a [`VerificationReport`].

pub mod types;

pub use types::{
    CountCheck, NullCheck, OrphanCheck, SampleCheck, TableVerification, VerificationReport,
    VerificationSummary,
};

use std::path::Path;

use tracing::{info, warn};

use crate::error::Result;
use crate::mapping::{MappingCatalog, TableMapping};
use crate::source::SourcePool;
use crate::target::TargetPool;

/// Records sampled from each side per table.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Compares migrated tables against their sources.
pub struct MigrationVerifier<'a> {
    source: &'a dyn SourcePool,
    target: &'a dyn TargetPool,
    catalog: &'a MappingCatalog,
    sample_size: usize,
}

impl<'a> MigrationVerifier<'a> {
    pub fn new(
        source: &'a dyn SourcePool,
        target: &'a dyn TargetPool,
        catalog: &'a MappingCatalog,
    ) -> Self {
        Self {
            source,
            target,
            catalog,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    /// Verify the given source tables, or every mapped table when empty.
    ///
    /// A failing query marks only its own table invalid; the report always
    /// covers every table.
    pub async fn verify(&self, source_tables: &[String]) -> VerificationReport {
        let tables: Vec<String> = if source_tables.is_empty() {
            self.catalog.migration_order().to_vec()
        } else {
            source_tables.to_vec()
        };

        let mut report = VerificationReport {
            generated_at: Some(chrono::Utc::now()),
            ..VerificationReport::default()
        };
        for table in &tables {
            let Some(mapping) = self.catalog.table(table) else {
                warn!("No mapping for {}, not verified", table);
                continue;
            };
            report.add_table(self.verify_table(mapping).await);
        }

        let s = &report.summary;
        info!(
            "Verification: {}/{} table(s) valid, {} error(s), {} warning(s)",
            s.valid_tables, s.total_tables, s.total_errors, s.total_warnings
        );
        report
    }

    async fn verify_table(&self, mapping: &TableMapping) -> TableVerification {
        let dest = mapping.destination_table.as_str();
        let mut result = TableVerification {
            source_table: mapping.source_table.clone(),
            destination_table: dest.to_string(),
            ..TableVerification::default()
        };

        self.check_counts(mapping, &mut result).await;

        match self.check_sample(mapping).await {
            Ok(sample) => result.sample = sample,
            Err(e) => result
                .errors
                .push(format!("{}: validation error: {}", dest, e)),
        }
        for column in &result.sample.missing_source_columns {
            result.warnings.push(format!(
                "{}: column {} missing from sampled source records",
                mapping.source_table, column
            ));
        }
        for column in &result.sample.missing_destination_columns {
            result.warnings.push(format!(
                "{}: column {} missing from sampled destination rows",
                dest, column
            ));
        }

        self.check_orphans(dest, &mut result).await;
        self.check_nulls(dest, &mut result).await;

        result.valid = result.errors.is_empty() && result.counts.matches;
        if result.valid {
            info!("{}: valid ({} records)", dest, result.counts.destination);
        } else {
            warn!(
                "{}: {} error(s), {} warning(s)",
                dest,
                result.errors.len(),
                result.warnings.len()
            );
        }
        result
    }

    /// Count mismatches and failed counts are warnings; either leaves
    /// `counts.matches` false.
    async fn check_counts(&self, mapping: &TableMapping, result: &mut TableVerification) {
        let dest = mapping.destination_table.as_str();
        let source_count = self.source.get_record_count(&mapping.source_table).await;
        let dest_count = self.target.get_record_count(dest).await;

        match (source_count, dest_count) {
            (Ok(source), Ok(destination)) => {
                result.counts = CountCheck {
                    source,
                    destination,
                    matches: source == destination,
                };
                if source != destination {
                    result.warnings.push(format!(
                        "{}: record count mismatch (source {}, destination {})",
                        dest, source, destination
                    ));
                }
            }
            (source, destination) => {
                if let Err(e) = &source {
                    result.warnings.push(format!(
                        "{}: cannot count source records: {}",
                        mapping.source_table, e
                    ));
                }
                if let Err(e) = &destination {
                    result
                        .warnings
                        .push(format!("{}: cannot count destination rows: {}", dest, e));
                }
                result.counts = CountCheck {
                    source: source.unwrap_or(0),
                    destination: destination.unwrap_or(0),
                    matches: false,
                };
            }
        }
    }

    async fn check_orphans(&self, dest: &str, result: &mut TableVerification) {
        let foreign_keys = match self.target.foreign_keys(dest).await {
            Ok(fks) => fks,
            Err(e) => {
                result
                    .errors
                    .push(format!("{}: could not check foreign keys: {}", dest, e));
                return;
            }
        };

        for fk in foreign_keys {
            let orphans = match self.target.count_orphans(dest, &fk).await {
                Ok(n) => n,
                Err(e) => {
                    result.errors.push(format!(
                        "{}.{}: could not count orphans: {}",
                        dest, fk.column, e
                    ));
                    continue;
                }
            };
            if orphans > 0 {
                result.errors.push(format!(
                    "{}.{}: {} orphaned reference(s) to {}",
                    dest, fk.column, orphans, fk.referenced_table
                ));
            }
            result.orphans.push(OrphanCheck {
                constraint: fk.constraint_name,
                column: fk.column,
                referenced_table: fk.referenced_table,
                orphans,
            });
        }
    }

    async fn check_nulls(&self, dest: &str, result: &mut TableVerification) {
        let required = match self.target.required_columns(dest).await {
            Ok(columns) => columns,
            Err(e) => {
                result
                    .errors
                    .push(format!("{}: could not check required columns: {}", dest, e));
                return;
            }
        };

        for column in required {
            match self.target.count_nulls(dest, &column).await {
                Ok(0) => {}
                Ok(nulls) => {
                    result.errors.push(format!(
                        "{}.{}: {} null value(s) in a required column",
                        dest, column, nulls
                    ));
                    result.nulls.push(NullCheck { column, nulls });
                }
                Err(e) => result.errors.push(format!(
                    "{}.{}: could not count nulls: {}",
                    dest, column, e
                )),
            }
        }
    }

    async fn check_sample(&self, mapping: &TableMapping) -> Result<SampleCheck> {
        let source_rows = self
            .source
            .fetch_all(&mapping.source_table, Some(self.sample_size))
            .await?;
        let dest_rows = self
            .target
            .sample_records(&mapping.destination_table, self.sample_size)
            .await?;

        let missing_source_columns = match source_rows.first() {
            Some(row) => mapping
                .source_columns()
                .into_iter()
                .filter(|c| !row.contains_key(*c))
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };
        let missing_destination_columns = match dest_rows.first() {
            Some(row) => mapping
                .destination_columns()
                .into_iter()
                .filter(|c| !row.contains_key(*c))
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };

        Ok(SampleCheck {
            source_sampled: source_rows.len(),
            destination_sampled: dest_rows.len(),
            missing_source_columns,
            missing_destination_columns,
        })
    }
}

impl VerificationReport {
    /// Write the report as pretty JSON, creating parent directories.
    pub fn save_report(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Verification report written to {}", path.display());
        Ok(())
    }
}
