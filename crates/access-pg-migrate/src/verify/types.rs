//! Report types for post-migration verification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source and destination row counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountCheck {
    pub source: i64,
    pub destination: i64,
    pub matches: bool,
}

/// Shape of a small sample from each side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCheck {
    pub source_sampled: usize,
    pub destination_sampled: usize,

    /// Mapped source columns absent from the sampled source records.
    pub missing_source_columns: Vec<String>,

    /// Mapped destination columns absent from the sampled destination rows.
    pub missing_destination_columns: Vec<String>,
}

/// Orphaned references for one foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanCheck {
    pub constraint: String,
    pub column: String,
    pub referenced_table: String,
    pub orphans: i64,
}

/// Nulls found in one required column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullCheck {
    pub column: String,
    pub nulls: i64,
}

/// Verification detail for one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableVerification {
    pub source_table: String,
    pub destination_table: String,
    pub valid: bool,
    pub counts: CountCheck,
    pub sample: SampleCheck,
    pub orphans: Vec<OrphanCheck>,
    pub nulls: Vec<NullCheck>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Totals across all verified tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub all_valid: bool,
    pub total_tables: usize,
    pub valid_tables: usize,
    pub total_source_records: i64,
    pub total_dest_records: i64,
    pub total_errors: usize,
    pub total_warnings: usize,
}

/// Full verification report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    pub generated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub summary: VerificationSummary,
    pub tables: BTreeMap<String, TableVerification>,
}

impl VerificationReport {
    /// Add a table and fold it into the summary.
    pub fn add_table(&mut self, table: TableVerification) {
        let s = &mut self.summary;
        s.total_tables += 1;
        if table.valid {
            s.valid_tables += 1;
        }
        s.total_source_records += table.counts.source;
        s.total_dest_records += table.counts.destination;
        s.total_errors += table.errors.len();
        s.total_warnings += table.warnings.len();
        s.all_valid = s.valid_tables == s.total_tables;

        self.tables.insert(table.destination_table.clone(), table);
    }
}
