//! Destination database operations.
//!
//! [`TargetPool`] is the capability the engine needs from the destination:
//! catalog reads, counted statements and row fetches. The integrity queries
//! used by the validators are default methods written against that core, so a
//! backend only has to implement the core to get them.

mod postgres;

pub use postgres::PgPool;

use async_trait::async_trait;

use crate::core::{ForeignKeyRef, Record, SqlValue, TableSchema, TransformedRecord};
use crate::error::Result;

/// Columns the engine manages itself and never reports as required.
const MANAGED_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

/// Trait for destination database operations.
#[async_trait]
pub trait TargetPool: Send + Sync {
    /// Base tables in the target schema.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Column metadata for a table. Empty when the table does not exist.
    async fn get_table_schema(&self, table: &str) -> Result<TableSchema>;

    /// Number of rows in a table.
    async fn get_record_count(&self, table: &str) -> Result<i64>;

    /// Run one statement in its own transaction and return the affected rows.
    ///
    /// Unique violations surface as [`MigrateError::DuplicateKey`](crate::MigrateError::DuplicateKey).
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run a query and return every row.
    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Record>>;

    /// Run a query and return its first row.
    async fn fetch_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Record>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self);

    /// Schema holding the destination tables.
    fn schema_name(&self) -> &str {
        "public"
    }

    /// Quoted, schema-qualified table name.
    fn qualify(&self, table: &str) -> String {
        qualify_table(self.schema_name(), table)
    }

    /// Insert one transformed record.
    async fn insert_record(&self, table: &str, record: &TransformedRecord) -> Result<u64> {
        let (sql, params) = build_insert_sql(&self.qualify(table), record);
        self.execute(&sql, &params).await
    }

    /// Selected columns of every row.
    async fn select_columns(&self, table: &str, columns: &[&str]) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {} FROM {}",
            column_list(columns),
            self.qualify(table)
        );
        self.fetch_all(&sql, &[]).await
    }

    /// Up to `limit` rows.
    async fn sample_records(&self, table: &str, limit: usize) -> Result<Vec<Record>> {
        let sql = format!("SELECT * FROM {} LIMIT {}", self.qualify(table), limit);
        self.fetch_all(&sql, &[]).await
    }

    /// Declared foreign key constraints of a table.
    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyRef>> {
        let params = [
            SqlValue::from(self.schema_name()),
            SqlValue::from(table),
        ];
        let rows = self.fetch_all(FOREIGN_KEYS_SQL, &params).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(ForeignKeyRef {
                    constraint_name: text_cell(row, "constraint_name")?,
                    column: text_cell(row, "column_name")?,
                    referenced_table: text_cell(row, "referenced_table")?,
                    referenced_column: text_cell(row, "referenced_column")?,
                })
            })
            .collect())
    }

    /// Non-null child values with no matching parent row.
    async fn count_orphans(&self, table: &str, fk: &ForeignKeyRef) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS orphans FROM {child} c \
             WHERE c.{col} IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM {parent} p WHERE p.{ref_col} = c.{col})",
            child = self.qualify(table),
            parent = self.qualify(&fk.referenced_table),
            col = quote_ident(&fk.column),
            ref_col = quote_ident(&fk.referenced_column),
        );
        Ok(count_cell(self.fetch_one(&sql, &[]).await?))
    }

    /// Non-nullable columns without a default, excluding engine-managed columns.
    async fn required_columns(&self, table: &str) -> Result<Vec<String>> {
        let params = [
            SqlValue::from(self.schema_name()),
            SqlValue::from(table),
        ];
        let rows = self.fetch_all(REQUIRED_COLUMNS_SQL, &params).await?;
        Ok(rows
            .iter()
            .filter_map(|row| text_cell(row, "column_name"))
            .filter(|c| !MANAGED_COLUMNS.contains(&c.as_str()))
            .collect())
    }

    /// Rows with a null in `column`.
    async fn count_nulls(&self, table: &str, column: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS nulls FROM {} WHERE {} IS NULL",
            self.qualify(table),
            quote_ident(column)
        );
        Ok(count_cell(self.fetch_one(&sql, &[]).await?))
    }
}

const FOREIGN_KEYS_SQL: &str = "\
SELECT tc.constraint_name::text AS constraint_name,
       kcu.column_name::text AS column_name,
       ccu.table_name::text AS referenced_table,
       ccu.column_name::text AS referenced_column
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
JOIN information_schema.constraint_column_usage ccu
  ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema
WHERE tc.constraint_type = 'FOREIGN KEY'
  AND tc.table_schema = $1::text
  AND tc.table_name = $2::text
ORDER BY tc.constraint_name";

const REQUIRED_COLUMNS_SQL: &str = "\
SELECT column_name::text AS column_name
FROM information_schema.columns
WHERE table_schema = $1::text
  AND table_name = $2::text
  AND is_nullable = 'NO'
  AND column_default IS NULL
ORDER BY ordinal_position";

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fully qualify a table name.
pub fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// SQL cast suffix for a bound value.
///
/// Every parameter travels in text format. Text is left uncast so the server
/// reads it as the column's own type, enum and uuid columns included.
pub fn sql_cast_for_value(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Null => "",
        SqlValue::Bool(_) => "::boolean",
        SqlValue::Int(_) => "::bigint",
        SqlValue::Float(_) => "::double precision",
        SqlValue::Decimal(_) => "::numeric",
        SqlValue::Text(_) => "",
        SqlValue::Bytes(_) => "::bytea",
        SqlValue::Date(_) => "::date",
        SqlValue::DateTime(_) => "::timestamp",
        SqlValue::DateTimeOffset(_) => "::timestamptz",
        SqlValue::Json(_) => "::jsonb",
    }
}

/// Build a single-row INSERT for the record's writable columns.
///
/// Null values are written as literal `NULL`; everything else is bound.
pub fn build_insert_sql(qualified_table: &str, record: &TransformedRecord) -> (String, Vec<SqlValue>) {
    let columns = record.insertable_columns();
    let mut params = Vec::new();
    let mut placeholders = Vec::with_capacity(columns.len());

    for (_, value) in &columns {
        if value.is_null() {
            placeholders.push("NULL".to_string());
        } else {
            params.push((*value).clone());
            placeholders.push(format!("${}{}", params.len(), sql_cast_for_value(value)));
        }
    }

    let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table,
        column_list(&names),
        placeholders.join(", ")
    );
    (sql, params)
}

fn text_cell(row: &Record, column: &str) -> Option<String> {
    row.get(column).and_then(SqlValue::as_str).map(str::to_string)
}

/// First column of a COUNT row as an integer.
fn count_cell(row: Option<Record>) -> i64 {
    row.and_then(|r| r.into_values().next())
        .and_then(|v| match v {
            SqlValue::Int(n) => Some(n),
            other => other.key_string().and_then(|s| s.parse().ok()),
        })
        .unwrap_or(0)
}
