//! File-based per-table progress for resumable runs.
//!
//! The whole document is rewritten (temp file, then rename) on every
//! mutation. A state file that cannot be read or parsed is discarded with a
//! warning and the run starts from empty state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};

const STATE_VERSION: &str = "1.0";

/// Persisted migration progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationState {
    pub version: String,

    /// When the last migration run started.
    pub started_at: Option<DateTime<Utc>>,

    pub last_updated: Option<DateTime<Utc>>,

    /// Per-table state keyed by destination table name.
    pub tables: BTreeMap<String, TableState>,
}

impl Default for MigrationState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            started_at: None,
            last_updated: None,
            tables: BTreeMap::new(),
        }
    }
}

/// Table status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Pending => "pending",
            TableStatus::InProgress => "in_progress",
            TableStatus::Completed => "completed",
            TableStatus::Failed => "failed",
        }
    }
}

/// Per-table state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    pub status: TableStatus,

    #[serde(default)]
    pub records_migrated: u64,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    pub last_updated: Option<DateTime<Utc>>,

    /// Error message if failed.
    pub error: Option<String>,

    /// SHA-256 of the source records at completion.
    pub checksum: Option<String>,
}

/// Fields to merge into a table's state. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TableUpdate {
    pub status: Option<TableStatus>,
    pub records_migrated: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// `Some(None)` clears the error.
    pub error: Option<Option<String>>,
    pub checksum: Option<String>,
}

impl TableUpdate {
    pub fn status(status: TableStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn records(mut self, records: u64) -> Self {
        self.records_migrated = Some(records);
        self
    }
}

/// Counts by status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateSummary {
    pub total_tables: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub records_migrated: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub tables: BTreeMap<String, TableState>,
}

/// State document bound to its file.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: MigrationState,
}

impl StateStore {
    /// Load state from `path`, or start empty when the file is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!(
                        "State file {} is corrupt ({}), starting with empty state",
                        path.display(),
                        e
                    );
                    MigrationState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MigrationState::default(),
            Err(e) => {
                warn!(
                    "State file {} is unreadable ({}), starting with empty state",
                    path.display(),
                    e
                );
                MigrationState::default()
            }
        };
        debug!("Loaded state for {} table(s)", state.tables.len());
        Self { path, state }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    /// State of a table, if it has been touched.
    pub fn get(&self, table: &str) -> Option<&TableState> {
        self.state.tables.get(table)
    }

    /// Merge `update` into a table's state, creating it if absent, and persist.
    pub fn update(&mut self, table: &str, update: TableUpdate) -> Result<()> {
        let now = Utc::now();
        let entry = self.state.tables.entry(table.to_string()).or_default();

        if let Some(status) = update.status {
            entry.status = status;
        }
        if let Some(records) = update.records_migrated {
            entry.records_migrated = records;
        }
        if let Some(started) = update.started_at {
            entry.started_at = Some(started);
        }
        if let Some(completed) = update.completed_at {
            entry.completed_at = Some(completed);
        }
        if let Some(error) = update.error {
            entry.error = error;
        }
        if let Some(checksum) = update.checksum {
            entry.checksum = Some(checksum);
        }
        entry.last_updated = Some(now);
        self.state.last_updated = Some(now);

        self.save()
    }

    /// Mark a table as being migrated.
    pub fn mark_in_progress(&mut self, table: &str) -> Result<()> {
        self.update(
            table,
            TableUpdate {
                status: Some(TableStatus::InProgress),
                records_migrated: Some(0),
                started_at: Some(Utc::now()),
                error: Some(None),
                ..TableUpdate::default()
            },
        )
    }

    pub fn mark_complete(&mut self, table: &str, records: u64, checksum: Option<String>) -> Result<()> {
        self.update(
            table,
            TableUpdate {
                status: Some(TableStatus::Completed),
                records_migrated: Some(records),
                completed_at: Some(Utc::now()),
                error: Some(None),
                checksum,
                ..TableUpdate::default()
            },
        )
    }

    /// Mark a table failed, keeping its partial record count.
    pub fn mark_failed(&mut self, table: &str, error: impl Into<String>) -> Result<()> {
        self.update(
            table,
            TableUpdate {
                status: Some(TableStatus::Failed),
                error: Some(Some(error.into())),
                ..TableUpdate::default()
            },
        )
    }

    /// True iff the table completed and `force` is not set.
    pub fn should_skip(&self, table: &str, force: bool) -> bool {
        !force
            && self
                .get(table)
                .is_some_and(|t| t.status == TableStatus::Completed)
    }

    /// Return one table to pending.
    pub fn reset(&mut self, table: &str) -> Result<()> {
        self.state
            .tables
            .insert(table.to_string(), TableState::default());
        self.state.last_updated = Some(Utc::now());
        self.save()
    }

    /// Forget all table state.
    pub fn reset_all(&mut self) -> Result<()> {
        self.state = MigrationState::default();
        self.save()
    }

    /// Stamp the start of a run.
    pub fn start_migration(&mut self) -> Result<()> {
        let now = Utc::now();
        self.state.started_at = Some(now);
        self.state.last_updated = Some(now);
        self.save()
    }

    pub fn summary(&self) -> StateSummary {
        let mut summary = StateSummary {
            total_tables: self.state.tables.len(),
            started_at: self.state.started_at,
            last_updated: self.state.last_updated,
            tables: self.state.tables.clone(),
            ..StateSummary::default()
        };
        for table in self.state.tables.values() {
            match table.status {
                TableStatus::Pending => summary.pending += 1,
                TableStatus::InProgress => summary.in_progress += 1,
                TableStatus::Completed => summary.completed += 1,
                TableStatus::Failed => summary.failed += 1,
            }
            summary.records_migrated += table.records_migrated;
        }
        summary
    }

    /// Atomic write: temp file, then rename.
    fn save(&self) -> Result<()> {
        let state_err =
            |e: &dyn std::fmt::Display| MigrateError::State(format!("{}: {}", self.path.display(), e));

        let content = serde_json::to_string_pretty(&self.state).map_err(|e| state_err(&e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| state_err(&e))?;
        }
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, &content).map_err(|e| state_err(&e))?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| state_err(&e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_should_skip_after_complete() {
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(dir.path().join("state.json"));

        assert!(!store.should_skip("x", false));
        store.mark_complete("x", 5, None).unwrap();
        assert!(store.should_skip("x", false));
        assert!(!store.should_skip("x", true));

        store.reset("x").unwrap();
        assert_eq!(store.get("x").unwrap().status, TableStatus::Pending);
        assert!(!store.should_skip("x", false));
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut store = StateStore::open(&path);
        store.mark_in_progress("customers").unwrap();
        store
            .update("customers", TableUpdate::default().records(40))
            .unwrap();
        store
            .mark_complete("customers", 42, Some("abc".to_string()))
            .unwrap();

        let reopened = StateStore::open(&path);
        let table = reopened.get("customers").unwrap();
        assert_eq!(table.status, TableStatus::Completed);
        assert_eq!(table.records_migrated, 42);
        assert_eq!(table.checksum.as_deref(), Some("abc"));
        assert!(table.started_at.is_some());
        assert!(table.completed_at.is_some());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_mark_failed_keeps_partial_count() {
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(dir.path().join("state.json"));
        store.mark_in_progress("users").unwrap();
        store.update("users", TableUpdate::default().records(300)).unwrap();
        store.mark_failed("users", "boom").unwrap();

        let table = store.get("users").unwrap();
        assert_eq!(table.status, TableStatus::Failed);
        assert_eq!(table.records_migrated, 300);
        assert_eq!(table.error.as_deref(), Some("boom"));
        assert!(!store.should_skip("users", false));
    }

    #[test]
    fn test_corrupt_file_resets_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = StateStore::open(&path);
        assert!(store.state().tables.is_empty());
        assert_eq!(store.state().version, "1.0");
    }

    #[test]
    fn test_reset_all_and_summary() {
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(dir.path().join("state.json"));
        store.mark_complete("customers", 3, None).unwrap();
        store.mark_complete("users", 2, None).unwrap();
        store.mark_failed("user_logs", "bad").unwrap();

        let summary = store.summary();
        assert_eq!(summary.total_tables, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.records_migrated, 5);
        assert_eq!(summary.tables["users"], *store.get("users").unwrap());
        assert_eq!(store.summary(), summary);

        store.reset_all().unwrap();
        assert_eq!(store.summary().total_tables, 0);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TableStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
