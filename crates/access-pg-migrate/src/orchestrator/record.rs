//! Per-record preparation between transform and insert.

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::{Record, SqlValue, TableSchema, TransformedRecord};
use crate::mapping::{DefaultValue, TableMapping};

/// Mint an identifier when the transform did not produce one.
pub fn ensure_identifier(record: &mut TransformedRecord) {
    let present = record
        .get("id")
        .and_then(SqlValue::key_string)
        .is_some_and(|id| !id.is_empty());
    if !present {
        record.insert("id", SqlValue::Text(Uuid::new_v4().to_string()));
    }
}

/// Fill table defaults for columns the source left absent or null.
pub fn apply_defaults(mapping: &TableMapping, record: &mut TransformedRecord, source: &Record) {
    for (column, default) in &mapping.defaults {
        if record.get(column).is_some_and(|v| !v.is_null()) {
            continue;
        }
        let value = match default {
            DefaultValue::Null => SqlValue::Null,
            DefaultValue::Now => SqlValue::DateTime(Utc::now().naive_utc()),
            DefaultValue::Int(n) => SqlValue::Int(*n),
            DefaultValue::Text(s) => SqlValue::Text(s.clone()),
            DefaultValue::ByPresence {
                candidates,
                otherwise,
            } => {
                let label = candidates
                    .iter()
                    .find(|(col, _)| source.get(col).is_some_and(|v| !v.is_null()))
                    .map(|(_, label)| label)
                    .unwrap_or(otherwise);
                SqlValue::Text(label.clone())
            }
        };
        record.insert(column.clone(), value);
    }
}

/// Stamp `created_at` / `updated_at` when the destination has them.
pub fn stamp_timestamps(record: &mut TransformedRecord, dest: &TableSchema) {
    let now = SqlValue::DateTime(Utc::now().naive_utc());
    for column in ["created_at", "updated_at"] {
        if dest.has_column(column) && record.get(column).map_or(true, SqlValue::is_null) {
            record.insert(column, now.clone());
        }
    }
}

/// Required columns still null after defaults.
///
/// A column whose declared default is [`DefaultValue::Null`] is left to the
/// database and never reported.
pub fn missing_required<'m>(mapping: &'m TableMapping, record: &TransformedRecord) -> Vec<&'m str> {
    mapping
        .required
        .iter()
        .filter(|col| record.get(col).map_or(true, SqlValue::is_null))
        .filter(|col| {
            !mapping
                .defaults
                .iter()
                .any(|(c, d)| c == *col && *d == DefaultValue::Null)
        })
        .map(String::as_str)
        .collect()
}

/// SHA-256 over the source records in fetch order.
pub fn source_checksum(records: &[Record]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        // BTreeMap serialization is ordered, so equal records hash equally
        if let Ok(bytes) = serde_json::to_vec(record) {
            hasher.update(&bytes);
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AccessType, Column};

    fn source(pairs: &[(&str, SqlValue)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_ensure_identifier() {
        let mut record = TransformedRecord::new();
        ensure_identifier(&mut record);
        let id = record.id().unwrap().to_string();
        assert_eq!(id.len(), 36);

        ensure_identifier(&mut record);
        assert_eq!(record.id(), Some(id.as_str()));

        let mut blank = TransformedRecord::new();
        blank.insert("id", SqlValue::from(""));
        ensure_identifier(&mut blank);
        assert!(!blank.id().unwrap().is_empty());
    }

    #[test]
    fn test_user_log_action_inferred_from_timestamps() {
        let mapping = crate::mapping::MappingCatalog::standard()
            .table("UserLogs")
            .cloned()
            .unwrap();

        let mut record = TransformedRecord::new();
        apply_defaults(
            &mapping,
            &mut record,
            &source(&[("Logout_Time", SqlValue::from("2023-01-01 17:00:00"))]),
        );
        assert_eq!(record.get("action"), Some(&SqlValue::from("logout")));

        let mut record = TransformedRecord::new();
        apply_defaults(&mapping, &mut record, &source(&[]));
        assert_eq!(record.get("action"), Some(&SqlValue::from("unknown")));
    }

    #[test]
    fn test_defaults_do_not_override_values() {
        let mapping = TableMapping::new("Pack_Info", "pack_info")
            .default_value("piece_count", DefaultValue::Int(1));
        let mut record = TransformedRecord::new();
        record.insert("piece_count", SqlValue::Int(4));
        apply_defaults(&mapping, &mut record, &Record::new());
        assert_eq!(record.get("piece_count"), Some(&SqlValue::Int(4)));

        let mut record = TransformedRecord::new();
        apply_defaults(&mapping, &mut record, &Record::new());
        assert_eq!(record.get("piece_count"), Some(&SqlValue::Int(1)));
    }

    #[test]
    fn test_timestamps_only_when_destination_has_them() {
        let with = TableSchema::new(
            "customers",
            vec![Column::access("created_at", AccessType::DateTime, None)],
        );
        let mut record = TransformedRecord::new();
        stamp_timestamps(&mut record, &with);
        assert!(record.contains("created_at"));
        assert!(!record.contains("updated_at"));
    }

    #[test]
    fn test_missing_required_respects_null_default() {
        let mapping = TableMapping::new("Delivery_Note", "delivery_note")
            .required(&["delivery_number", "customer_id"])
            .default_value("customer_id", DefaultValue::Null);

        let mut record = TransformedRecord::new();
        record.insert("customer_id", SqlValue::Null);
        assert_eq!(missing_required(&mapping, &record), vec!["delivery_number"]);

        record.insert("delivery_number", SqlValue::from("DN1"));
        assert!(missing_required(&mapping, &record).is_empty());
    }

    #[test]
    fn test_checksum_is_stable() {
        let records = vec![source(&[("Customer", SqlValue::from("Acme"))])];
        assert_eq!(source_checksum(&records), source_checksum(&records.clone()));
        assert_ne!(source_checksum(&records), source_checksum(&[]));
        assert_eq!(source_checksum(&records).len(), 64);
    }
}
