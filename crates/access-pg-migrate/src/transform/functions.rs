//! Value transformers.
//!
//! Every transformer is total: inputs it does not recognise produce null
//! (or `false` for booleans) instead of an error.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use crate::core::SqlValue;
use crate::lookup::LookupMap;

/// Day zero of the Access date serial.
const ACCESS_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Fallback formats tried after ISO-8601, first match wins.
const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S", "%d/%m/%Y %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Identifiers minted for raw source values, reused for equal inputs.
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    ids: HashMap<String, String>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier previously minted for this raw key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.ids.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.ids.iter()
    }
}

/// Mint a fresh identifier, or reuse the one already minted for an equal raw value.
///
/// Null raw values never share an identifier: each row without a natural
/// key gets its own.
pub fn transform_identifier(raw: &SqlValue, reuse: Option<&mut IdentifierMap>) -> String {
    match (reuse, raw.key_string()) {
        (Some(map), Some(key)) => map
            .ids
            .entry(key)
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone(),
        _ => Uuid::new_v4().to_string(),
    }
}

/// Convert a raw value to a timestamp.
///
/// Typed dates pass through. Text is tried as ISO-8601 and then against the
/// fallback formats in order; `MM/DD` is tried before `DD/MM`, so ambiguous
/// dates resolve month-first. Numbers are Access day serials.
pub fn transform_date(raw: &SqlValue) -> SqlValue {
    match raw {
        SqlValue::Date(_) | SqlValue::DateTime(_) | SqlValue::DateTimeOffset(_) => raw.clone(),
        SqlValue::Text(s) => parse_date_text(s.trim()).unwrap_or(SqlValue::Null),
        SqlValue::Int(n) => from_day_serial(*n as f64),
        SqlValue::Float(f) => from_day_serial(*f),
        SqlValue::Decimal(d) => d.to_f64().map(from_day_serial).unwrap_or(SqlValue::Null),
        _ => SqlValue::Null,
    }
}

fn parse_date_text(s: &str) -> Option<SqlValue> {
    if s.is_empty() {
        return None;
    }
    if let Some(value) = parse_iso8601(s) {
        return Some(value);
    }
    for fmt in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(SqlValue::DateTime(dt));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(SqlValue::DateTime);
        }
    }
    None
}

fn parse_iso8601(s: &str) -> Option<SqlValue> {
    let normalized = match s.strip_suffix('Z') {
        Some(rest) => format!("{}+00:00", rest),
        None => s.to_string(),
    };

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M%:z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(SqlValue::DateTimeOffset(dt));
        }
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(SqlValue::DateTime(dt));
        }
    }

    None
}

fn from_day_serial(days: f64) -> SqlValue {
    if !days.is_finite() {
        return SqlValue::Null;
    }
    let (y, m, d) = ACCESS_EPOCH;
    let micros = (days * 86_400_000_000.0).round();
    if micros.abs() > i64::MAX as f64 {
        return SqlValue::Null;
    }
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|epoch| epoch.and_hms_opt(0, 0, 0))
        .and_then(|epoch| epoch.checked_add_signed(Duration::microseconds(micros as i64)))
        .map(SqlValue::DateTime)
        .unwrap_or(SqlValue::Null)
}

/// Convert a raw value to an exact decimal.
///
/// Text has `$`, `,` and surrounding whitespace removed before parsing.
pub fn transform_decimal(raw: &SqlValue) -> SqlValue {
    let parsed = match raw {
        SqlValue::Decimal(d) => Some(*d),
        SqlValue::Int(n) => Some(Decimal::from(*n)),
        SqlValue::Float(f) => {
            Decimal::from_str(&f.to_string()).ok().or_else(|| Decimal::try_from(*f).ok())
        }
        SqlValue::Text(s) => {
            let cleaned: String = s.chars().filter(|c| *c != '$' && *c != ',').collect();
            let cleaned = cleaned.trim();
            Decimal::from_str(cleaned)
                .ok()
                .or_else(|| Decimal::from_scientific(cleaned).ok())
        }
        _ => None,
    };
    parsed.map(SqlValue::Decimal).unwrap_or(SqlValue::Null)
}

/// Normalise a raw value to trimmed text, null when empty.
///
/// Bytes are decoded as UTF-8, falling back to Latin-1. A `max_length` of
/// zero means no limit.
pub fn transform_text(raw: &SqlValue, max_length: Option<usize>) -> SqlValue {
    let text = match raw {
        SqlValue::Null => return SqlValue::Null,
        SqlValue::Text(s) => s.trim().to_string(),
        SqlValue::Bytes(bytes) => decode_bytes(bytes).trim().to_string(),
        other if !other.is_truthy() => return SqlValue::Null,
        other => other.to_string().trim().to_string(),
    };

    let text = match max_length {
        Some(max) if max > 0 && text.chars().count() > max => text.chars().take(max).collect(),
        _ => text,
    };

    if text.is_empty() {
        SqlValue::Null
    } else {
        SqlValue::Text(text)
    }
}

fn decode_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        // every byte is a valid Latin-1 code point
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Convert a raw value to a boolean. Never null.
///
/// Recognises `yes/true/1/-1/y` and `no/false/0/n` in any case; other values
/// fall back to their truthiness.
pub fn transform_boolean(raw: &SqlValue) -> bool {
    match raw {
        SqlValue::Null => false,
        SqlValue::Bool(b) => *b,
        SqlValue::Int(n) => *n != 0,
        SqlValue::Float(f) => *f != 0.0,
        SqlValue::Decimal(d) => !d.is_zero(),
        SqlValue::Text(s) => match s.trim().to_lowercase().as_str() {
            "yes" | "true" | "1" | "-1" | "y" => true,
            "no" | "false" | "0" | "n" => false,
            _ => raw.is_truthy(),
        },
        other => other.is_truthy(),
    }
}

/// Convert a raw value to an integer, truncating fractional parts.
pub fn transform_integer(raw: &SqlValue) -> SqlValue {
    let parsed = match raw {
        SqlValue::Int(n) => Some(*n),
        SqlValue::Bool(b) => Some(i64::from(*b)),
        SqlValue::Float(f) => truncate_float(*f),
        SqlValue::Decimal(d) => d.trunc().to_i64(),
        SqlValue::Text(s) => s.trim().parse::<f64>().ok().and_then(truncate_float),
        _ => None,
    };
    parsed.map(SqlValue::Int).unwrap_or(SqlValue::Null)
}

fn truncate_float(f: f64) -> Option<i64> {
    if f.is_finite() && f.abs() < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

/// Convert a raw value to a JSON document.
///
/// Unparseable text is kept as `{"raw": text}`; other scalars as `{"value": text}`.
pub fn transform_json(raw: &SqlValue) -> SqlValue {
    match raw {
        SqlValue::Null => SqlValue::Null,
        SqlValue::Json(v) => SqlValue::Json(v.clone()),
        SqlValue::Text(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(v) => SqlValue::Json(v),
            Err(_) => SqlValue::Json(serde_json::json!({ "raw": s })),
        },
        other => SqlValue::Json(serde_json::json!({ "value": other.to_string() })),
    }
}

/// Resolve a raw natural key to a destination identifier.
///
/// A null value or missing map resolves to null when `allow_null`, otherwise
/// to an empty string so a required reference fails loudly at insert time.
/// Keys are matched trimmed, then upper-cased.
pub fn lookup_foreign_key(raw: &SqlValue, map: Option<&LookupMap>, allow_null: bool) -> SqlValue {
    let unresolved = || {
        if allow_null {
            SqlValue::Null
        } else {
            SqlValue::Text(String::new())
        }
    };

    let (Some(key), Some(map)) = (raw.key_string(), map) else {
        return unresolved();
    };

    match map.resolve(&key) {
        Some(id) => SqlValue::Text(id.to_string()),
        None => unresolved(),
    }
}
