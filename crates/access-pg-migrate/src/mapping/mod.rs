//! Table, field and lookup mapping between Access tables and destination tables.
//!
//! A [`MappingCatalog`] is built once at startup (see [`MappingCatalog::standard`])
//! and passed by reference to the validator, the lookup builder and the runner.

mod standard;

use std::collections::{BTreeMap, HashSet};

use crate::transform::Transform;

static NO_TRANSFORMS: BTreeMap<String, Transform> = BTreeMap::new();

/// One source column copied into one destination column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: String,
    pub destination: String,
}

/// Value used for a required destination column the source did not supply.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// Explicit null; the column is left to the database default.
    Null,

    /// Current timestamp.
    Now,

    Int(i64),

    Text(String),

    /// Label of the first listed source column holding a non-null value,
    /// or `otherwise` when none does.
    ByPresence {
        candidates: Vec<(String, String)>,
        otherwise: String,
    },
}

/// Mapping of one source table onto one destination table.
#[derive(Debug, Clone)]
pub struct TableMapping {
    pub source_table: String,
    pub destination_table: String,

    /// Source to destination columns, in declaration order.
    pub fields: Vec<FieldMapping>,

    /// Transform per destination column.
    pub transforms: BTreeMap<String, Transform>,

    /// Destination columns that must be populated.
    pub required: Vec<String>,

    /// Fallbacks for required columns, applied in order.
    pub defaults: Vec<(String, DefaultValue)>,
}

impl TableMapping {
    pub fn new(source_table: impl Into<String>, destination_table: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
            destination_table: destination_table.into(),
            fields: Vec::new(),
            transforms: BTreeMap::new(),
            required: Vec::new(),
            defaults: Vec::new(),
        }
    }

    pub fn field(mut self, source: &str, destination: &str) -> Self {
        self.fields.push(FieldMapping {
            source: source.to_string(),
            destination: destination.to_string(),
        });
        self
    }

    pub fn transform(mut self, destination: &str, transform: Transform) -> Self {
        self.transforms.insert(destination.to_string(), transform);
        self
    }

    pub fn required(mut self, columns: &[&str]) -> Self {
        self.required = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn default_value(mut self, column: &str, value: DefaultValue) -> Self {
        self.defaults.push((column.to_string(), value));
        self
    }

    /// Distinct source columns, in declaration order.
    pub fn source_columns(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.fields
            .iter()
            .map(|f| f.source.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// Distinct destination columns, in declaration order.
    pub fn destination_columns(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.fields
            .iter()
            .map(|f| f.destination.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// Destination columns fed by more than one source column.
    pub fn duplicate_destinations(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut dupes = Vec::new();
        for f in &self.fields {
            if !seen.insert(f.destination.as_str()) && !dupes.contains(&f.destination.as_str()) {
                dupes.push(f.destination.as_str());
            }
        }
        dupes
    }

    /// True when the identifier column reuses identifiers per raw value.
    pub fn reuses_identifiers(&self) -> bool {
        matches!(
            self.transforms.get("id"),
            Some(Transform::Identifier { reuse: true })
        )
    }
}

/// Secondary natural key stored as its own upper-cased lookup map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateKey {
    pub source_key: String,
    pub destination_key: String,

    /// Registry name of the alternate map.
    pub name: String,
}

/// Natural key used to correlate source rows with destination rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupKeyConfig {
    pub source_table: String,
    pub destination_table: String,
    pub source_key: String,
    pub destination_key: String,
    pub alternate: Option<AlternateKey>,
}

impl LookupKeyConfig {
    pub fn new(
        source_table: &str,
        destination_table: &str,
        source_key: &str,
        destination_key: &str,
    ) -> Self {
        Self {
            source_table: source_table.to_string(),
            destination_table: destination_table.to_string(),
            source_key: source_key.to_string(),
            destination_key: destination_key.to_string(),
            alternate: None,
        }
    }

    pub fn with_alternate(mut self, source_key: &str, destination_key: &str, name: &str) -> Self {
        self.alternate = Some(AlternateKey {
            source_key: source_key.to_string(),
            destination_key: destination_key.to_string(),
            name: name.to_string(),
        });
        self
    }
}

/// Result of resolving configured destination table names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSelection {
    /// Source tables selected, in migration order.
    pub tables: Vec<String>,

    /// Configured names that match no mapping.
    pub unknown: Vec<String>,
}

/// Immutable set of table mappings, lookup keys and migration order.
#[derive(Debug, Clone, Default)]
pub struct MappingCatalog {
    tables: Vec<TableMapping>,
    lookups: Vec<LookupKeyConfig>,
    reference_tables: Vec<String>,
    migration_order: Vec<String>,
}

impl MappingCatalog {
    pub fn new(
        tables: Vec<TableMapping>,
        lookups: Vec<LookupKeyConfig>,
        reference_tables: Vec<String>,
        migration_order: Vec<String>,
    ) -> Self {
        Self {
            tables,
            lookups,
            reference_tables,
            migration_order,
        }
    }

    /// Mapping for a source table.
    pub fn table(&self, source_table: &str) -> Option<&TableMapping> {
        self.tables.iter().find(|t| t.source_table == source_table)
    }

    /// Mapping whose destination table has this name.
    pub fn table_by_destination(&self, destination_table: &str) -> Option<&TableMapping> {
        self.tables
            .iter()
            .find(|t| t.destination_table == destination_table)
    }

    pub fn tables(&self) -> &[TableMapping] {
        &self.tables
    }

    /// Source to destination columns for a source table; empty when unmapped.
    pub fn field_mapping(&self, source_table: &str) -> &[FieldMapping] {
        self.table(source_table)
            .map(|t| t.fields.as_slice())
            .unwrap_or(&[])
    }

    /// Transforms for a destination table; empty when unmapped.
    pub fn transform_set(&self, destination_table: &str) -> &BTreeMap<String, Transform> {
        self.table_by_destination(destination_table)
            .map(|t| &t.transforms)
            .unwrap_or(&NO_TRANSFORMS)
    }

    /// Destination table for a source table, defaulting to the lower-cased name.
    pub fn destination_table_name(&self, source_table: &str) -> String {
        self.table(source_table)
            .map(|t| t.destination_table.clone())
            .unwrap_or_else(|| source_table.to_lowercase())
    }

    /// Source columns the mapping reads.
    pub fn required_source_columns(&self, source_table: &str) -> Vec<&str> {
        self.table(source_table)
            .map(TableMapping::source_columns)
            .unwrap_or_default()
    }

    /// Destination columns that must be populated.
    pub fn required_destination_columns(&self, destination_table: &str) -> &[String] {
        self.table_by_destination(destination_table)
            .map(|t| t.required.as_slice())
            .unwrap_or(&[])
    }

    /// Natural key configuration for a source table.
    pub fn lookup_key(&self, source_table: &str) -> Option<&LookupKeyConfig> {
        self.lookups.iter().find(|l| l.source_table == source_table)
    }

    pub fn lookup_keys(&self) -> &[LookupKeyConfig] {
        &self.lookups
    }

    /// Source tables migrated during the lookup phase.
    pub fn reference_tables(&self) -> &[String] {
        &self.reference_tables
    }

    pub fn is_reference_table(&self, source_table: &str) -> bool {
        self.reference_tables.iter().any(|t| t == source_table)
    }

    /// Source tables in dependency order.
    pub fn migration_order(&self) -> &[String] {
        &self.migration_order
    }

    /// Source table for a destination name, matched case-insensitively.
    pub fn source_table_for(&self, destination_table: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|t| t.destination_table.eq_ignore_ascii_case(destination_table))
            .map(|t| t.source_table.as_str())
    }

    /// Resolve configured destination names to source tables.
    ///
    /// An empty list selects every table in the migration order.
    pub fn resolve_tables(&self, destination_tables: &[String]) -> TableSelection {
        if destination_tables.is_empty() {
            return TableSelection {
                tables: self.migration_order.clone(),
                unknown: Vec::new(),
            };
        }

        let mut wanted = HashSet::new();
        let mut unknown = Vec::new();
        for name in destination_tables {
            match self.source_table_for(name) {
                Some(source) => {
                    wanted.insert(source.to_string());
                }
                None => unknown.push(name.clone()),
            }
        }

        TableSelection {
            tables: self
                .migration_order
                .iter()
                .filter(|t| wanted.contains(*t))
                .cloned()
                .collect(),
            unknown,
        }
    }
}
