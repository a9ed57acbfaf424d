//! PostgreSQL destination pool.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::error::SqlState;
use bytes::BytesMut;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};
use tokio_postgres::{Config as PgConfig, NoTls, Row};
use tracing::{debug, info};

use super::TargetPool;
use crate::config::TargetConfig;
use crate::core::{Column, Record, SqlValue, TableSchema};
use crate::error::{MigrateError, Result};

const MAX_CONNECTIONS: usize = 4;

/// PostgreSQL target pool implementation.
pub struct PgPool {
    pool: Pool,
    schema: String,
}

impl PgPool {
    /// Connect and verify the target with `SELECT 1`.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let pg_config = match &config.connection_string {
            Some(conn_str) => conn_str
                .parse::<PgConfig>()
                .map_err(|e| MigrateError::Config(format!("Invalid target connection_string: {}", e)))?,
            None => {
                let mut pg_config = PgConfig::new();
                pg_config.host(&config.host);
                pg_config.port(config.port);
                pg_config.dbname(&config.database);
                pg_config.user(&config.user);
                pg_config.password(&config.password);
                pg_config
            }
        };

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(MAX_CONNECTIONS)
            .build()
            .map_err(|e| {
                MigrateError::connection(format!("Failed to create pool: {}", e), "PostgreSQL target")
            })?;

        let pg = Self {
            pool,
            schema: config.schema.clone(),
        };

        let client = pg.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e.to_string(), "PostgreSQL target"))?;

        info!("Connected to PostgreSQL: {}", config.display_name());
        Ok(pg)
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            MigrateError::connection(
                format!("Failed to get connection: {}", e),
                "PostgreSQL target",
            )
        })
    }
}

#[async_trait]
impl TargetPool for PgPool {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self
            .fetch_all(
                "SELECT table_name::text AS table_name FROM information_schema.tables \
                 WHERE table_schema = $1::text AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[SqlValue::from(self.schema.as_str())],
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get("table_name").and_then(SqlValue::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        let rows = self
            .fetch_all(
                "SELECT column_name::text AS column_name, data_type::text AS data_type, \
                        character_maximum_length::int4 AS size, \
                        (is_nullable = 'YES') AS nullable, \
                        (column_default IS NOT NULL) AS has_default \
                 FROM information_schema.columns \
                 WHERE table_schema = $1::text AND table_name = $2::text \
                 ORDER BY ordinal_position",
                &[SqlValue::from(self.schema.as_str()), SqlValue::from(table)],
            )
            .await?;

        let columns = rows
            .iter()
            .filter_map(|r| {
                Some(Column {
                    name: r.get("column_name")?.as_str()?.to_string(),
                    data_type: r
                        .get("data_type")
                        .and_then(SqlValue::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    size: match r.get("size") {
                        Some(SqlValue::Int(n)) => i32::try_from(*n).ok(),
                        _ => None,
                    },
                    nullable: matches!(r.get("nullable"), Some(SqlValue::Bool(true))),
                    has_default: matches!(r.get("has_default"), Some(SqlValue::Bool(true))),
                })
            })
            .collect();

        Ok(TableSchema::new(table, columns))
    }

    async fn get_record_count(&self, table: &str) -> Result<i64> {
        let client = self.client().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", self.qualify(table));
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get(0))
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut client = self.client().await?;
        let boxed: Vec<Box<dyn ToSql + Sync + Send>> = params.iter().map(sql_value_to_param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = boxed
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let tx = client.transaction().await?;
        let affected = tx.execute(sql, &refs).await.map_err(statement_error)?;
        tx.commit().await?;

        debug!("{} row(s) affected", affected);
        Ok(affected)
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Record>> {
        let client = self.client().await?;
        let boxed: Vec<Box<dyn ToSql + Sync + Send>> = params.iter().map(sql_value_to_param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = boxed
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = client.query(sql, &refs).await.map_err(statement_error)?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }

    fn schema_name(&self) -> &str {
        &self.schema
    }
}

/// Classify a statement failure; unique violations become `DuplicateKey`.
fn statement_error(e: tokio_postgres::Error) -> MigrateError {
    match e.as_db_error() {
        Some(db) if db.code() == &SqlState::UNIQUE_VIOLATION => {
            MigrateError::DuplicateKey(db.message().to_string())
        }
        Some(db) => MigrateError::Statement(format!("{} ({})", db.message(), db.code().code())),
        None => MigrateError::Target(e),
    }
}

/// A parameter sent in text format.
///
/// The server parses it as whatever type the statement assigns, so an
/// uncast placeholder takes the column's own type (varchar, enum, uuid).
#[derive(Debug)]
struct TextParam(Option<String>);

impl ToSql for TextParam {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match &self.0 {
            Some(text) => {
                out.extend_from_slice(text.as_bytes());
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// Text form of a bound value, in PostgreSQL input syntax.
fn param_text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Bool(b) => Some(if *b { "t" } else { "f" }.to_string()),
        SqlValue::Int(n) => Some(n.to_string()),
        SqlValue::Float(f) => Some(f.to_string()),
        SqlValue::Decimal(d) => Some(d.to_string()),
        SqlValue::Text(s) => Some(s.clone()),
        SqlValue::Bytes(b) => Some(format!("\\x{}", hex::encode(b))),
        SqlValue::Date(d) => Some(d.to_string()),
        SqlValue::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        SqlValue::DateTimeOffset(dt) => Some(dt.to_rfc3339()),
        SqlValue::Json(v) => Some(v.to_string()),
    }
}

fn sql_value_to_param(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    Box::new(TextParam(param_text(value)))
}

fn row_to_record(row: &Row) -> Record {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| (col.name().to_string(), convert_pg_value(row, idx, col.type_().name())))
        .collect()
}

fn convert_pg_value(row: &Row, idx: usize, type_name: &str) -> SqlValue {
    let value = match type_name {
        "bool" => row.try_get::<_, Option<bool>>(idx).ok().flatten().map(SqlValue::Bool),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|n| SqlValue::Int(n.into())),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|n| SqlValue::Int(n.into())),
        "int8" => row.try_get::<_, Option<i64>>(idx).ok().flatten().map(SqlValue::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|f| SqlValue::Float(f.into())),
        "float8" => row.try_get::<_, Option<f64>>(idx).ok().flatten().map(SqlValue::Float),
        "numeric" => row
            .try_get::<_, Option<rust_decimal::Decimal>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Decimal),
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(idx)
            .ok()
            .flatten()
            .map(|u| SqlValue::Text(u.to_string())),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::DateTime),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::FixedOffset>>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::DateTimeOffset),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Date),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Json),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bytes),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Text),
    };
    value.unwrap_or(SqlValue::Null)
}
