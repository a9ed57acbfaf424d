//! In-memory source and target doubles for engine tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use access_pg_migrate::core::{AccessType, Column, ForeignKeyRef, Record, SqlValue, TableSchema};
use access_pg_migrate::{
    Config, MappingCatalog, MigrateError, Result, SourcePool, TargetPool, TransformedRecord,
};
use async_trait::async_trait;

/// Build a record from column/value pairs.
pub fn record(pairs: &[(&str, SqlValue)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Config with a state file under `dir`.
pub fn test_config(dir: &Path) -> Config {
    let yaml = format!(
        r#"
source:
  path: production.mdb
target:
  host: localhost
  database: textile
  user: migrator
migration:
  batch_size: 2
  state_file: {}
validation:
  sample_records: 5
"#,
        dir.join("migration-state.json").display()
    );
    Config::from_yaml(&yaml).unwrap()
}

// =============================================================================
// Source
// =============================================================================

/// Access source backed by fixed tables.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: BTreeMap<String, (TableSchema, Vec<Record>)>,
    /// Listed, but every read fails.
    broken: BTreeSet<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mapped source table, with no rows.
    pub fn from_catalog(catalog: &MappingCatalog) -> Self {
        let mut source = Self::new();
        for mapping in catalog.tables() {
            source = source.table(&mapping.source_table, &mapping.source_columns(), Vec::new());
        }
        source
    }

    pub fn table(mut self, name: &str, columns: &[&str], rows: Vec<Record>) -> Self {
        let schema = TableSchema::new(
            name,
            columns
                .iter()
                .map(|c| Column::access(*c, AccessType::Varchar, Some(255)))
                .collect(),
        );
        self.tables.insert(name.to_string(), (schema, rows));
        self
    }

    /// Keep the table listed but fail every read of it.
    pub fn broken(mut self, name: &str) -> Self {
        self.broken.insert(name.to_string());
        self
    }

    fn check_readable(&self, table: &str) -> Result<()> {
        if self.broken.contains(table) {
            return Err(MigrateError::Source(format!("read error on {}", table)));
        }
        Ok(())
    }

    /// Replace the rows of an existing table.
    pub fn rows(mut self, name: &str, rows: Vec<Record>) -> Self {
        if let Some(entry) = self.tables.get_mut(name) {
            entry.1 = rows;
        }
        self
    }
}

#[async_trait]
impl SourcePool for MemorySource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        self.check_readable(table)?;
        Ok(self
            .tables
            .get(table)
            .map(|(schema, _)| schema.clone())
            .unwrap_or_else(|| TableSchema::new(table, Vec::new())))
    }

    async fn get_record_count(&self, table: &str) -> Result<i64> {
        self.check_readable(table)?;
        self.tables
            .get(table)
            .map(|(_, rows)| rows.len() as i64)
            .ok_or_else(|| MigrateError::Source(format!("no such table: {}", table)))
    }

    async fn fetch_all(&self, table: &str, limit: Option<usize>) -> Result<Vec<Record>> {
        self.check_readable(table)?;
        let (_, rows) = self
            .tables
            .get(table)
            .ok_or_else(|| MigrateError::Source(format!("no such table: {}", table)))?;
        Ok(rows
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

// =============================================================================
// Target
// =============================================================================

const MANAGED_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

#[derive(Debug, Clone, Default)]
pub struct MemTable {
    pub columns: Vec<Column>,
    pub unique: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyRef>,
    pub rows: Vec<Record>,
}

/// `records_migrated` of one table, read from the state file before each
/// insert into it.
#[derive(Debug, Clone)]
struct ProgressWatch {
    state_file: PathBuf,
    table: String,
    seen: Vec<u64>,
}

/// PostgreSQL stand-in enforcing NOT NULL and unique columns.
///
/// Clones share their tables, so a test can keep a handle after passing
/// one to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct MemoryTarget {
    tables: Arc<Mutex<BTreeMap<String, MemTable>>>,
    progress: Arc<Mutex<Option<ProgressWatch>>>,
}

fn dest_column(name: &str, nullable: bool) -> Column {
    Column {
        name: name.to_string(),
        data_type: "text".to_string(),
        size: None,
        nullable,
        has_default: false,
    }
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mapped destination table. Required columns are NOT NULL and
    /// `id` is unique.
    pub fn from_catalog(catalog: &MappingCatalog) -> Self {
        let target = Self::new();
        for mapping in catalog.tables() {
            let mut names: BTreeSet<&str> = mapping.destination_columns().into_iter().collect();
            names.extend(mapping.transforms.keys().map(String::as_str));
            names.extend(mapping.required.iter().map(String::as_str));
            names.extend(["created_at", "updated_at"]);
            names.remove("id");

            let mut columns = vec![("id", false)];
            columns.extend(
                names
                    .into_iter()
                    .map(|n| (n, !mapping.required.iter().any(|r| r == n))),
            );
            target.create_table(&mapping.destination_table, &columns);
        }
        target
    }

    /// Create a table with `(name, nullable)` columns; `id` is unique.
    pub fn create_table(&self, name: &str, columns: &[(&str, bool)]) {
        let table = MemTable {
            columns: columns.iter().map(|(c, n)| dest_column(c, *n)).collect(),
            unique: vec!["id".to_string()],
            ..MemTable::default()
        };
        self.tables.lock().unwrap().insert(name.to_string(), table);
    }

    pub fn drop_table(&self, name: &str) {
        self.tables.lock().unwrap().remove(name);
    }

    pub fn unique(&self, table: &str, column: &str) {
        if let Some(t) = self.tables.lock().unwrap().get_mut(table) {
            t.unique.push(column.to_string());
        }
    }

    pub fn foreign_key(&self, table: &str, column: &str, referenced_table: &str) {
        if let Some(t) = self.tables.lock().unwrap().get_mut(table) {
            t.foreign_keys.push(ForeignKeyRef {
                constraint_name: format!("{}_{}_fkey", table, column),
                column: column.to_string(),
                referenced_table: referenced_table.to_string(),
                referenced_column: "id".to_string(),
            });
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Insert a row without any constraint checks.
    pub fn push_row(&self, table: &str, row: Record) {
        if let Some(t) = self.tables.lock().unwrap().get_mut(table) {
            t.rows.push(row);
        }
    }

    /// Record the persisted progress of `table` before every insert into it.
    pub fn watch_progress(&self, state_file: &Path, table: &str) {
        *self.progress.lock().unwrap() = Some(ProgressWatch {
            state_file: state_file.to_path_buf(),
            table: table.to_string(),
            seen: Vec::new(),
        });
    }

    /// Progress seen by each insert, in insert order.
    pub fn watched_progress(&self) -> Vec<u64> {
        self.progress
            .lock()
            .unwrap()
            .as_ref()
            .map(|w| w.seen.clone())
            .unwrap_or_default()
    }

    fn observe_progress(&self, table: &str) {
        let mut progress = self.progress.lock().unwrap();
        let Some(watch) = progress.as_mut().filter(|w| w.table == table) else {
            return;
        };
        let recorded = std::fs::read_to_string(&watch.state_file)
            .ok()
            .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
            .and_then(|state| state["tables"][table]["records_migrated"].as_u64())
            .unwrap_or(0);
        watch.seen.push(recorded);
    }

    /// Identifier of the first row whose `column` equals `value`.
    pub fn id_where(&self, table: &str, column: &str, value: &str) -> Option<String> {
        self.rows(table).into_iter().find_map(|row| {
            (row.get(column).and_then(SqlValue::key_string).as_deref() == Some(value))
                .then(|| row.get("id").and_then(SqlValue::key_string))
                .flatten()
        })
    }
}

fn missing_relation(table: &str) -> MigrateError {
    MigrateError::Statement(format!("relation \"{}\" does not exist", table))
}

#[async_trait]
impl TargetPool for MemoryTarget {
    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.lock().unwrap().keys().cloned().collect())
    }

    async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        let columns = self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default();
        Ok(TableSchema::new(table, columns))
    }

    async fn get_record_count(&self, table: &str) -> Result<i64> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.rows.len() as i64)
            .ok_or_else(|| missing_relation(table))
    }

    async fn execute(&self, _sql: &str, _params: &[SqlValue]) -> Result<u64> {
        Err(MigrateError::Statement(
            "raw SQL is not supported by the in-memory target".to_string(),
        ))
    }

    async fn fetch_all(&self, _sql: &str, _params: &[SqlValue]) -> Result<Vec<Record>> {
        Err(MigrateError::Statement(
            "raw SQL is not supported by the in-memory target".to_string(),
        ))
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}

    async fn insert_record(&self, table: &str, record: &TransformedRecord) -> Result<u64> {
        self.observe_progress(table);
        let mut tables = self.tables.lock().unwrap();
        let t = tables.get_mut(table).ok_or_else(|| missing_relation(table))?;

        let row: Record = record
            .insertable_columns()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();

        if let Some(column) = row.keys().find(|k| !t.columns.iter().any(|c| &c.name == *k)) {
            return Err(MigrateError::Statement(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                column, table
            )));
        }
        for column in t.columns.iter().filter(|c| !c.nullable && !c.has_default) {
            if row.get(&column.name).map_or(true, SqlValue::is_null) {
                return Err(MigrateError::Statement(format!(
                    "null value in column \"{}\" violates not-null constraint",
                    column.name
                )));
            }
        }
        for column in &t.unique {
            let Some(value) = row.get(column).and_then(SqlValue::key_string) else {
                continue;
            };
            let taken = t.rows.iter().any(|r| {
                r.get(column).and_then(SqlValue::key_string).as_deref() == Some(value.as_str())
            });
            if taken {
                return Err(MigrateError::DuplicateKey(format!(
                    "{}_{}_key: ({})=({}) already exists",
                    table, column, column, value
                )));
            }
        }

        t.rows.push(row);
        Ok(1)
    }

    async fn select_columns(&self, table: &str, columns: &[&str]) -> Result<Vec<Record>> {
        let tables = self.tables.lock().unwrap();
        let t = tables.get(table).ok_or_else(|| missing_relation(table))?;
        Ok(t.rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| {
                        (
                            c.to_string(),
                            row.get(*c).cloned().unwrap_or(SqlValue::Null),
                        )
                    })
                    .collect()
            })
            .collect())
    }

    async fn sample_records(&self, table: &str, limit: usize) -> Result<Vec<Record>> {
        let tables = self.tables.lock().unwrap();
        let t = tables.get(table).ok_or_else(|| missing_relation(table))?;
        // Rows carry every declared column, as a SELECT * would.
        Ok(t.rows
            .iter()
            .take(limit)
            .map(|row| {
                t.columns
                    .iter()
                    .map(|c| {
                        (
                            c.name.clone(),
                            row.get(&c.name).cloned().unwrap_or(SqlValue::Null),
                        )
                    })
                    .collect()
            })
            .collect())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyRef>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.foreign_keys.clone())
            .unwrap_or_default())
    }

    async fn count_orphans(&self, table: &str, fk: &ForeignKeyRef) -> Result<i64> {
        let tables = self.tables.lock().unwrap();
        let child = tables.get(table).ok_or_else(|| missing_relation(table))?;
        let parents: BTreeSet<String> = tables
            .get(&fk.referenced_table)
            .map(|p| {
                p.rows
                    .iter()
                    .filter_map(|r| r.get(&fk.referenced_column)?.key_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(child
            .rows
            .iter()
            .filter_map(|r| r.get(&fk.column)?.key_string())
            .filter(|v| !parents.contains(v))
            .count() as i64)
    }

    async fn required_columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| {
                t.columns
                    .iter()
                    .filter(|c| !c.nullable && !c.has_default)
                    .filter(|c| !MANAGED_COLUMNS.contains(&c.name.as_str()))
                    .map(|c| c.name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_nulls(&self, table: &str, column: &str) -> Result<i64> {
        let tables = self.tables.lock().unwrap();
        let t = tables.get(table).ok_or_else(|| missing_relation(table))?;
        Ok(t.rows
            .iter()
            .filter(|r| r.get(column).map_or(true, SqlValue::is_null))
            .count() as i64)
    }
}
