//! Schema metadata for source and destination tables.

use serde::{Deserialize, Serialize};

/// Canonical column type of an Access column.
///
/// Both source backends normalise their native type names through
/// [`AccessType::from_declared`], so callers see the same inference
/// whichever backend read the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessType {
    Varchar,
    Integer,
    DateTime,
    Decimal,
    Boolean,
}

impl AccessType {
    /// Infer the canonical type from a declared type name.
    ///
    /// Accepts mdb-schema declarations (`Text (50)`, `Long Integer`, `Yes/No`),
    /// ODBC catalog names (`VARCHAR`, `COUNTER`, `BIT`) and the canonical names
    /// themselves. Unknown types are treated as text.
    pub fn from_declared(declared: &str) -> AccessType {
        let t = declared.trim().to_ascii_uppercase();
        if t.contains("TEXT") || t.contains("CHAR") {
            AccessType::Varchar
        } else if t.contains("INTEGER")
            || t.contains("INT")
            || t.contains("COUNTER")
            || t.contains("BYTE")
        {
            AccessType::Integer
        } else if t.contains("DATE") || t.contains("TIME") {
            AccessType::DateTime
        } else if t.contains("DOUBLE")
            || t.contains("DECIMAL")
            || t.contains("CURRENCY")
            || t.contains("NUMERIC")
            || t.contains("MONEY")
            || t.contains("SINGLE")
            || t.contains("REAL")
            || t.contains("FLOAT")
        {
            AccessType::Decimal
        } else if t.contains("YES/NO") || t.contains("BOOLEAN") || t == "BIT" {
            AccessType::Boolean
        } else {
            AccessType::Varchar
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Varchar => "VARCHAR",
            AccessType::Integer => "INTEGER",
            AccessType::DateTime => "DATETIME",
            AccessType::Decimal => "DECIMAL",
            AccessType::Boolean => "BOOLEAN",
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Type name: canonical [`AccessType`] name for source columns, the
    /// PostgreSQL `data_type` for destination columns.
    #[serde(rename = "type")]
    pub data_type: String,

    /// Declared size for sized types.
    pub size: Option<i32>,

    /// Whether the column accepts NULL.
    pub nullable: bool,

    /// Whether the column has a database default.
    #[serde(default)]
    pub has_default: bool,
}

impl Column {
    /// Build a source column from an inferred Access type.
    pub fn access(name: impl Into<String>, access_type: AccessType, size: Option<i32>) -> Self {
        Self {
            name: name.into(),
            data_type: access_type.as_str().to_string(),
            size,
            nullable: true,
            has_default: false,
        }
    }

    /// Canonical Access type of this column.
    pub fn access_type(&self) -> AccessType {
        AccessType::from_declared(&self.data_type)
    }

    /// `TYPE(size)` display used in schema summaries.
    pub fn type_display(&self) -> String {
        match self.size {
            Some(size) => format!("{}({})", self.data_type, size),
            None => self.data_type.clone(),
        }
    }
}

/// Table metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Columns in ordinal order.
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Declared foreign key constraint on a destination table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Constraint name.
    pub constraint_name: String,

    /// Referencing column on the child table.
    pub column: String,

    /// Parent table.
    pub referenced_table: String,

    /// Referenced column on the parent table.
    pub referenced_column: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mdb_schema_type_inference() {
        assert_eq!(AccessType::from_declared("Text (50)"), AccessType::Varchar);
        assert_eq!(AccessType::from_declared("Long Integer"), AccessType::Integer);
        assert_eq!(AccessType::from_declared("Integer"), AccessType::Integer);
        assert_eq!(AccessType::from_declared("DateTime"), AccessType::DateTime);
        assert_eq!(AccessType::from_declared("Currency"), AccessType::Decimal);
        assert_eq!(AccessType::from_declared("Double"), AccessType::Decimal);
        assert_eq!(AccessType::from_declared("Boolean"), AccessType::Boolean);
        assert_eq!(AccessType::from_declared("Yes/No"), AccessType::Boolean);
        assert_eq!(AccessType::from_declared("Memo/Hyperlink"), AccessType::Varchar);
    }

    #[test]
    fn test_odbc_type_inference_matches() {
        assert_eq!(AccessType::from_declared("VARCHAR"), AccessType::Varchar);
        assert_eq!(AccessType::from_declared("LONGCHAR"), AccessType::Varchar);
        assert_eq!(AccessType::from_declared("COUNTER"), AccessType::Integer);
        assert_eq!(AccessType::from_declared("SMALLINT"), AccessType::Integer);
        assert_eq!(AccessType::from_declared("DATETIME"), AccessType::DateTime);
        assert_eq!(AccessType::from_declared("BIT"), AccessType::Boolean);
        assert_eq!(AccessType::from_declared("NUMERIC"), AccessType::Decimal);
    }

    #[test]
    fn test_canonical_names_round_trip() {
        for t in [
            AccessType::Varchar,
            AccessType::Integer,
            AccessType::DateTime,
            AccessType::Decimal,
            AccessType::Boolean,
        ] {
            assert_eq!(AccessType::from_declared(t.as_str()), t);
        }
    }

    #[test]
    fn test_type_display() {
        let col = Column::access("Customer", AccessType::Varchar, Some(100));
        assert_eq!(col.type_display(), "VARCHAR(100)");
        let col = Column::access("Qty", AccessType::Integer, None);
        assert_eq!(col.type_display(), "INTEGER");
    }
}
