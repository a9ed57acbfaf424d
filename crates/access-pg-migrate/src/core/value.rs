//! Value and record types shared by the source reader, the transformers and
//! the target writer.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::ser::{Serialize, Serializer};

/// A single cell value, either read from the source or produced by a transform.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Absent value.
    Null,

    /// Boolean value (Access Yes/No).
    Bool(bool),

    /// Integer value (Access Byte, Integer, Long Integer, AutoNumber).
    Int(i64),

    /// Floating point value (Access Single, Double).
    Float(f64),

    /// Exact numeric value (Access Currency, Decimal).
    Decimal(Decimal),

    /// Text value (Access Text, Memo).
    Text(String),

    /// Raw bytes (Access OLE Object, or text in an unknown encoding).
    Bytes(Vec<u8>),

    /// Date without time component.
    Date(NaiveDate),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Structured JSON document.
    Json(serde_json::Value),
}

impl SqlValue {
    /// Returns true for [`SqlValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Truthiness of a value that no transform recognised.
    ///
    /// Empty text, empty bytes, zero and null are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            SqlValue::Null => false,
            SqlValue::Bool(b) => *b,
            SqlValue::Int(n) => *n != 0,
            SqlValue::Float(f) => *f != 0.0,
            SqlValue::Decimal(d) => !d.is_zero(),
            SqlValue::Text(s) => !s.is_empty(),
            SqlValue::Bytes(b) => !b.is_empty(),
            SqlValue::Date(_) | SqlValue::DateTime(_) | SqlValue::DateTimeOffset(_) => true,
            SqlValue::Json(v) => match v {
                serde_json::Value::Null => false,
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::String(s) => !s.is_empty(),
                serde_json::Value::Array(a) => !a.is_empty(),
                serde_json::Value::Object(o) => !o.is_empty(),
                serde_json::Value::Number(_) => true,
            },
        }
    }

    /// Text form used as a lookup or memoization key.
    ///
    /// Returns `None` for null so that absent values never match a key.
    pub fn key_string(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            other => Some(other.to_string().trim().to_string()),
        }
    }

    /// Borrow the inner string for text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(n) => write!(f, "{}", n),
            SqlValue::Float(n) => write!(f, "{}", n),
            SqlValue::Decimal(d) => write!(f, "{}", d),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Bytes(b) => write!(f, "\\x{}", hex::encode(b)),
            SqlValue::Date(d) => write!(f, "{}", d),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::DateTimeOffset(dt) => write!(f, "{}", dt.to_rfc3339()),
            SqlValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(b) => serializer.serialize_bool(*b),
            SqlValue::Int(n) => serializer.serialize_i64(*n),
            SqlValue::Float(n) => serializer.serialize_f64(*n),
            SqlValue::Json(v) => v.serialize(serializer),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Int(n)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// A source row keyed by column name.
pub type Record = BTreeMap<String, SqlValue>;

/// A destination row keyed by destination column name.
///
/// Built per source record by the transform pipeline and consumed by the insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformedRecord {
    columns: BTreeMap<String, SqlValue>,
}

impl TransformedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing any earlier value.
    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Destination identifier, when present as text.
    pub fn id(&self) -> Option<&str> {
        self.columns.get("id").and_then(SqlValue::as_str)
    }

    /// Iterate columns in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SqlValue)> {
        self.columns.iter()
    }

    /// Columns that should be written.
    ///
    /// Null values are dropped so the database applies its own column default,
    /// except for the identifier and timestamp columns which are always kept.
    pub fn insertable_columns(&self) -> Vec<(&str, &SqlValue)> {
        self.columns
            .iter()
            .filter(|(name, value)| {
                !value.is_null() || matches!(name.as_str(), "id" | "created_at" | "updated_at")
            })
            .map(|(name, value)| (name.as_str(), value))
            .collect()
    }

    pub fn into_inner(self) -> BTreeMap<String, SqlValue> {
        self.columns
    }
}

impl From<BTreeMap<String, SqlValue>> for TransformedRecord {
    fn from(columns: BTreeMap<String, SqlValue>) -> Self {
        Self { columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_string_trims_and_skips_null() {
        assert_eq!(SqlValue::from("  Acme ").key_string().as_deref(), Some("Acme"));
        assert_eq!(SqlValue::Int(42).key_string().as_deref(), Some("42"));
        assert_eq!(SqlValue::Null.key_string(), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!SqlValue::Null.is_truthy());
        assert!(!SqlValue::from("").is_truthy());
        assert!(SqlValue::from("maybe").is_truthy());
        assert!(!SqlValue::Float(0.0).is_truthy());
        assert!(SqlValue::Int(-1).is_truthy());
    }

    #[test]
    fn test_insertable_columns_drop_nulls_except_id_and_timestamps() {
        let mut record = TransformedRecord::new();
        record.insert("id", SqlValue::from("abc"));
        record.insert("customer_id", SqlValue::Null);
        record.insert("updated_at", SqlValue::Null);
        record.insert("name", SqlValue::from("Acme"));

        let cols: Vec<&str> = record.insertable_columns().iter().map(|(c, _)| *c).collect();
        assert_eq!(cols, vec!["id", "name", "updated_at"]);
    }

    #[test]
    fn test_serialize_values() {
        let json = serde_json::to_string(&SqlValue::Null).unwrap();
        assert_eq!(json, "null");
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let json = serde_json::to_string(&SqlValue::Date(date)).unwrap();
        assert_eq!(json, "\"2024-03-01\"");
    }
}
