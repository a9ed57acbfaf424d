//! Transform descriptors and the per-record transform pipeline.
//!
//! Each destination column names a [`Transform`]; [`Transform::apply`] is the
//! single dispatch point from descriptor to the functions in [`functions`].

pub mod functions;

pub use functions::{
    lookup_foreign_key, transform_boolean, transform_date, transform_decimal, transform_identifier,
    transform_integer, transform_json, transform_text, IdentifierMap,
};

use crate::core::{Record, SqlValue, TransformedRecord};
use crate::lookup::LookupRegistry;
use crate::mapping::TableMapping;

/// How a destination column value is produced from its source value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    /// Mint an identifier. With `reuse`, equal raw values share one identifier
    /// through the table's [`IdentifierMap`].
    Identifier { reuse: bool },

    /// Timestamp from typed dates, text or Access day serials.
    Date,

    /// Exact decimal, tolerating currency formatting.
    Decimal,

    /// Trimmed text, optionally truncated.
    Text { max_length: Option<usize> },

    /// Boolean from Access Yes/No values and common spellings.
    Boolean,

    /// Integer, truncating fractions.
    Integer,

    /// JSON document.
    Json,

    /// Destination identifier resolved through the named lookup map.
    ForeignKey { lookup: String, allow_null: bool },

    /// One of two labels chosen by the boolean value of the source.
    Label { when_true: String, when_false: String },
}

impl Transform {
    /// Untruncated text.
    pub fn text() -> Self {
        Transform::Text { max_length: None }
    }

    pub fn foreign_key(lookup: impl Into<String>, allow_null: bool) -> Self {
        Transform::ForeignKey {
            lookup: lookup.into(),
            allow_null,
        }
    }

    pub fn label(when_true: impl Into<String>, when_false: impl Into<String>) -> Self {
        Transform::Label {
            when_true: when_true.into(),
            when_false: when_false.into(),
        }
    }

    /// Short name used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Transform::Identifier { .. } => "identifier",
            Transform::Date => "date",
            Transform::Decimal => "decimal",
            Transform::Text { .. } => "text",
            Transform::Boolean => "boolean",
            Transform::Integer => "integer",
            Transform::Json => "json",
            Transform::ForeignKey { .. } => "foreign_key",
            Transform::Label { .. } => "label",
        }
    }

    /// Produce the destination value for one raw source value.
    pub fn apply(&self, raw: &SqlValue, ctx: &mut TransformContext<'_>) -> SqlValue {
        match self {
            Transform::Identifier { reuse } => {
                let ids = if *reuse {
                    ctx.identifiers.as_deref_mut()
                } else {
                    None
                };
                SqlValue::Text(transform_identifier(raw, ids))
            }
            Transform::Date => transform_date(raw),
            Transform::Decimal => transform_decimal(raw),
            Transform::Text { max_length } => transform_text(raw, *max_length),
            Transform::Boolean => SqlValue::Bool(transform_boolean(raw)),
            Transform::Integer => transform_integer(raw),
            Transform::Json => transform_json(raw),
            Transform::ForeignKey { lookup, allow_null } => {
                lookup_foreign_key(raw, ctx.lookups.get(lookup), *allow_null)
            }
            Transform::Label {
                when_true,
                when_false,
            } => {
                let label = if transform_boolean(raw) {
                    when_true
                } else {
                    when_false
                };
                SqlValue::Text(label.clone())
            }
        }
    }
}

/// Shared state a transform may read or extend.
pub struct TransformContext<'a> {
    /// Lookup maps for foreign key resolution.
    pub lookups: &'a LookupRegistry,

    /// Identifier reuse map for the table being migrated.
    pub identifiers: Option<&'a mut IdentifierMap>,
}

impl<'a> TransformContext<'a> {
    pub fn new(lookups: &'a LookupRegistry) -> Self {
        Self {
            lookups,
            identifiers: None,
        }
    }

    pub fn with_identifiers(mut self, identifiers: &'a mut IdentifierMap) -> Self {
        self.identifiers = Some(identifiers);
        self
    }
}

/// Map and transform one source record.
///
/// Source columns absent from the record are treated as null. Destination
/// columns without a declared transform are cleaned as text. When two source
/// columns map to the same destination column the later one wins.
pub fn apply_transformations(
    mapping: &TableMapping,
    record: &Record,
    ctx: &mut TransformContext<'_>,
) -> TransformedRecord {
    let mut transformed = TransformedRecord::new();
    let fallback = Transform::text();

    for field in &mapping.fields {
        let raw = record.get(&field.source).unwrap_or(&SqlValue::Null);
        let transform = mapping.transforms.get(&field.destination).unwrap_or(&fallback);
        transformed.insert(field.destination.clone(), transform.apply(raw, ctx));
    }

    transformed
}
