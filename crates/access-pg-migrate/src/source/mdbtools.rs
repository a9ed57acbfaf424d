//! Access reader backed by the mdbtools command-line utilities.
//!
//! Every tool check runs under a fixed timeout. A check that times out, fails to
//! start or exits non-zero is logged and treated as returning nothing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{convert_text_value, is_system_table, SourcePool};
use crate::core::{AccessType, Column, Record, TableSchema};
use crate::error::{MigrateError, Result};

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);
const LIST_TIMEOUT: Duration = Duration::from_secs(30);
const SCHEMA_TIMEOUT: Duration = Duration::from_secs(30);
const COUNT_TIMEOUT: Duration = Duration::from_secs(60);
const EXPORT_TIMEOUT: Duration = Duration::from_secs(300);

/// mdbtools-backed Access reader.
pub struct MdbToolsSource {
    path: PathBuf,
    schemas: Mutex<HashMap<String, TableSchema>>,
}

impl MdbToolsSource {
    /// Open a database file, verifying that mdbtools can read it.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let path_arg = path.to_string_lossy().into_owned();

        match run_tool("mdb-ver", &[path_arg.as_str()], CHECK_TIMEOUT).await {
            Some(version) => {
                info!(
                    "Opened Access database via mdbtools: {} ({})",
                    path.display(),
                    version.trim()
                );
                Ok(Self {
                    path,
                    schemas: Mutex::new(HashMap::new()),
                })
            }
            None => Err(MigrateError::connection(
                "mdb-ver did not respond",
                format!("mdbtools check of {}", path.display()),
            )),
        }
    }

    fn path_arg(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Column types for a table, described once and cached.
    async fn column_types(&self, table: &str) -> Result<HashMap<String, AccessType>> {
        let schema = {
            let cached = self.schemas.lock().await.get(table).cloned();
            match cached {
                Some(schema) => schema,
                None => self.get_table_schema(table).await?,
            }
        };
        Ok(schema
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.access_type()))
            .collect())
    }

    async fn export(&self, table: &str, limit: Duration) -> Option<String> {
        let path = self.path_arg();
        run_tool("mdb-export", &[path.as_str(), table], limit).await
    }
}

#[async_trait]
impl SourcePool for MdbToolsSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let path = self.path_arg();
        let Some(output) = run_tool("mdb-tables", &["-1", path.as_str()], LIST_TIMEOUT).await else {
            return Ok(Vec::new());
        };
        Ok(parse_table_list(&output))
    }

    async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        if let Some(schema) = self.schemas.lock().await.get(table) {
            return Ok(schema.clone());
        }

        let path = self.path_arg();
        let mut columns = match run_tool("mdb-schema", &[path.as_str()], SCHEMA_TIMEOUT).await {
            Some(ddl) => parse_mdb_schema(&ddl, table),
            None => Vec::new(),
        };

        if columns.is_empty() {
            debug!("mdb-schema gave no columns for {}, reading export header", table);
            if let Some(csv_text) =
                run_tool("mdb-export", &[path.as_str(), table], SCHEMA_TIMEOUT).await
            {
                columns = parse_export_header(&csv_text)?;
            }
        }

        let schema = TableSchema::new(table, columns);
        if !schema.is_empty() {
            self.schemas
                .lock()
                .await
                .insert(table.to_string(), schema.clone());
        }
        Ok(schema)
    }

    async fn get_record_count(&self, table: &str) -> Result<i64> {
        let Some(csv_text) = self.export(table, COUNT_TIMEOUT).await else {
            return Ok(0);
        };
        let mut reader = csv_reader(&csv_text);
        let mut count = 0i64;
        for record in reader.records() {
            record?;
            count += 1;
        }
        Ok(count)
    }

    async fn fetch_all(&self, table: &str, limit: Option<usize>) -> Result<Vec<Record>> {
        let types = self.column_types(table).await?;
        let Some(csv_text) = self.export(table, EXPORT_TIMEOUT).await else {
            warn!("mdb-export returned nothing for {}", table);
            return Ok(Vec::new());
        };
        parse_export_records(&csv_text, &types, limit)
    }

    fn db_type(&self) -> &str {
        "mdbtools"
    }

    async fn close(&self) {
        self.schemas.lock().await.clear();
    }
}

/// Run an mdbtools utility, returning stdout on success.
async fn run_tool(program: &str, args: &[&str], limit: Duration) -> Option<String> {
    let output = tokio::time::timeout(
        limit,
        Command::new(program).args(args).kill_on_drop(true).output(),
    )
    .await;

    match output {
        Ok(Ok(out)) if out.status.success() => {
            Some(String::from_utf8_lossy(&out.stdout).into_owned())
        }
        Ok(Ok(out)) => {
            debug!(
                "{} exited with {}: {}",
                program,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
            None
        }
        Ok(Err(e)) => {
            debug!("{} could not be started: {}", program, e);
            None
        }
        Err(_) => {
            warn!("{} timed out after {}s", program, limit.as_secs());
            None
        }
    }
}

fn csv_reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes())
}

/// Table names from `mdb-tables -1`, without system tables.
fn parse_table_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty() && !is_system_table(name))
        .map(str::to_string)
        .collect()
}

/// Columns of one table from `mdb-schema` DDL.
///
/// Column lines look like `[Customer]   Text (100),`.
fn parse_mdb_schema(ddl: &str, table: &str) -> Vec<Column> {
    let mut columns = Vec::new();
    let mut in_table = false;

    for line in ddl.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("CREATE TABLE") {
            if in_table {
                break;
            }
            let name = rest.trim().trim_matches(|c: char| matches!(c, '[' | ']' | '`' | '"'));
            in_table = name.eq_ignore_ascii_case(table);
            continue;
        }

        if !in_table {
            continue;
        }
        if line.starts_with(')') {
            break;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let Some(end) = rest.find(']') else {
                continue;
            };
            let name = &rest[..end];
            let declared = rest[end + 1..].trim().trim_end_matches(',').trim();
            columns.push(Column::access(
                name,
                AccessType::from_declared(declared),
                declared_size(declared),
            ));
        }
    }

    columns
}

/// Size in `Text (50)` style declarations.
fn declared_size(declared: &str) -> Option<i32> {
    let open = declared.find('(')?;
    let close = declared[open..].find(')')? + open;
    declared[open + 1..close].trim().parse().ok()
}

/// Column names from an `mdb-export` header row, typed as text.
fn parse_export_header(csv_text: &str) -> Result<Vec<Column>> {
    let mut reader = csv_reader(csv_text);
    let headers = reader.headers()?;
    Ok(headers
        .iter()
        .map(|name| Column::access(name, AccessType::Varchar, None))
        .collect())
}

fn parse_export_records(
    csv_text: &str,
    types: &HashMap<String, AccessType>,
    limit: Option<usize>,
) -> Result<Vec<Record>> {
    let mut reader = csv_reader(csv_text);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    for row in reader.records() {
        if limit.is_some_and(|n| records.len() >= n) {
            break;
        }
        let row = row?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(name, cell)| {
                let access_type = types.get(name).copied().unwrap_or(AccessType::Varchar);
                (name.clone(), convert_text_value(cell, access_type))
            })
            .collect();
        records.push(record);
    }
    Ok(records)
}
