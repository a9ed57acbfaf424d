//! Access reader using an ODBC driver.
//!
//! Requires unixODBC (or the Windows driver manager) and one of the Access
//! drivers listed in [`ACCESS_DRIVERS`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use odbc_api::{buffers::TextRowSet, ConnectionOptions, Cursor, Environment, ResultSetMetadata};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{convert_text_value, is_system_table, SourcePool};
use crate::core::{AccessType, Column, Record, TableSchema};
use crate::error::{MigrateError, Result};

/// Drivers tried in order when opening the database.
const ACCESS_DRIVERS: &[&str] = &[
    "Microsoft Access Driver (*.mdb, *.accdb)",
    "Microsoft Access Driver (*.mdb)",
    "MDBTools",
];

const FETCH_BATCH: usize = 1000;
const MAX_TEXT_LEN: usize = 65536;

type TextRows = Vec<Vec<Option<String>>>;

/// ODBC-backed Access reader.
pub struct OdbcAccessPool {
    env: Arc<Environment>,
    connection_string: String,
    path: PathBuf,
    /// Serializes ODBC calls; the driver is not thread-safe.
    conn_mutex: Mutex<()>,
}

/// Escape an identifier for bracketed notation: `a]b` -> `a]]b`.
fn escape_ident(s: &str) -> String {
    s.replace(']', "]]")
}

fn odbc_err(context: &str) -> impl Fn(odbc_api::Error) -> MigrateError + '_ {
    move |e| MigrateError::Source(format!("{}: {}", context, e))
}

impl OdbcAccessPool {
    /// Open the database with the first Access driver that accepts it.
    pub fn new(path: &Path) -> Result<Self> {
        let env = Environment::new().map_err(|e| {
            MigrateError::connection(
                format!("Failed to create ODBC environment: {}", e),
                "ODBC connection",
            )
        })?;

        let mut last_error = String::from("no driver tried");
        for driver in ACCESS_DRIVERS {
            let connection_string = format!("Driver={{{}}};DBQ={};", driver, path.display());
            debug!("Trying ODBC driver {}", driver);

            let connected = env
                .connect_with_connection_string(&connection_string, ConnectionOptions::default())
                .map(|_conn| ());

            match connected {
                Ok(()) => {
                    info!("Opened Access database via ODBC ({}): {}", driver, path.display());
                    return Ok(Self {
                        env: Arc::new(env),
                        connection_string,
                        path: path.to_path_buf(),
                        conn_mutex: Mutex::new(()),
                    });
                }
                Err(e) => last_error = format!("{}: {}", driver, e),
            }
        }

        Err(MigrateError::connection(
            format!("No Access ODBC driver could open the database ({})", last_error),
            "ODBC connection",
        ))
    }

    fn get_connection(&self) -> Result<odbc_api::Connection<'_>> {
        self.env
            .connect_with_connection_string(&self.connection_string, ConnectionOptions::default())
            .map_err(|e| {
                MigrateError::connection(
                    format!("ODBC connection failed: {}", e),
                    format!("opening {}", self.path.display()),
                )
            })
    }

    /// Run a query and return column names with text cells.
    fn query_sync(&self, sql: &str) -> Result<(Vec<String>, TextRows)> {
        let conn = self.get_connection()?;
        let cursor = conn
            .execute(sql, ())
            .map_err(|e| MigrateError::Source(format!("ODBC query failed: {} - SQL: {}", e, sql)))?;
        match cursor {
            Some(cursor) => collect_rows(cursor),
            None => Ok((Vec::new(), Vec::new())),
        }
    }

    fn list_tables_sync(&self) -> Result<Vec<String>> {
        let conn = self.get_connection()?;
        let cursor = conn
            .tables("", "", "", "TABLE")
            .map_err(odbc_err("listing tables"))?;
        let (_, rows) = collect_rows(cursor)?;

        // TABLE_NAME is the third catalog column
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get(2).cloned().flatten())
            .filter(|name| !is_system_table(name))
            .collect())
    }

    fn table_schema_sync(&self, table: &str) -> Result<TableSchema> {
        let conn = self.get_connection()?;
        let cursor = conn
            .columns("", "", table, "")
            .map_err(odbc_err("reading columns"))?;
        let (_, rows) = collect_rows(cursor)?;

        // COLUMN_NAME (3), TYPE_NAME (5), COLUMN_SIZE (6)
        let columns = rows
            .into_iter()
            .filter_map(|row| {
                let name = row.get(3).cloned().flatten()?;
                let type_name = row.get(5).cloned().flatten().unwrap_or_default();
                let access_type = AccessType::from_declared(&type_name);
                let size = match access_type {
                    AccessType::Varchar => row
                        .get(6)
                        .and_then(|v| v.as_ref())
                        .and_then(|s| s.parse().ok()),
                    _ => None,
                };
                Some(Column::access(name, access_type, size))
            })
            .collect();

        Ok(TableSchema::new(table, columns))
    }
}

#[async_trait]
impl SourcePool for OdbcAccessPool {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let _lock = self.conn_mutex.lock().await;
        self.list_tables_sync()
    }

    async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        let _lock = self.conn_mutex.lock().await;
        self.table_schema_sync(table)
    }

    async fn get_record_count(&self, table: &str) -> Result<i64> {
        let _lock = self.conn_mutex.lock().await;
        let sql = format!("SELECT COUNT(*) FROM [{}]", escape_ident(table));
        let (_, rows) = self.query_sync(&sql)?;

        Ok(rows
            .first()
            .and_then(|r| r.first())
            .and_then(|v| v.as_ref())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0))
    }

    async fn fetch_all(&self, table: &str, limit: Option<usize>) -> Result<Vec<Record>> {
        let _lock = self.conn_mutex.lock().await;

        let types: HashMap<String, AccessType> = self
            .table_schema_sync(table)?
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.access_type()))
            .collect();

        let sql = match limit {
            Some(n) => format!("SELECT TOP {} * FROM [{}]", n, escape_ident(table)),
            None => format!("SELECT * FROM [{}]", escape_ident(table)),
        };
        let (names, rows) = self.query_sync(&sql)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                names
                    .iter()
                    .zip(row)
                    .map(|(name, cell)| {
                        let access_type = types.get(name).copied().unwrap_or(AccessType::Varchar);
                        let value = cell
                            .map(|text| convert_text_value(&text, access_type))
                            .unwrap_or(crate::core::SqlValue::Null);
                        (name.clone(), value)
                    })
                    .collect()
            })
            .collect())
    }

    fn db_type(&self) -> &str {
        "odbc"
    }

    async fn close(&self) {
        // connections are opened per call and closed on drop
    }
}

/// Drain a cursor into column names and text cells.
fn collect_rows<C: Cursor>(mut cursor: C) -> Result<(Vec<String>, TextRows)> {
    let names = cursor
        .column_names()
        .map_err(odbc_err("reading column names"))?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(odbc_err("reading column names"))?;
    let num_cols = names.len();

    let mut buffers = TextRowSet::for_cursor(FETCH_BATCH, &mut cursor, Some(MAX_TEXT_LEN))
        .map_err(odbc_err("creating row buffer"))?;
    let mut row_cursor = cursor
        .bind_buffer(&mut buffers)
        .map_err(odbc_err("binding row buffer"))?;

    let mut rows = Vec::new();
    while let Some(batch) = row_cursor.fetch().map_err(odbc_err("fetching rows"))? {
        for row_idx in 0..batch.num_rows() {
            let row = (0..num_cols)
                .map(|col_idx| {
                    batch
                        .at(col_idx, row_idx)
                        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                })
                .collect();
            rows.push(row);
        }
    }

    Ok((names, rows))
}
