//! Natural key to destination identifier maps used to resolve foreign keys.
//!
//! For every reference table a [`LookupMap`] is built once its rows exist in
//! the destination, either because they were just migrated or because an
//! earlier run left them there. Maps live only for the duration of a run.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::core::{Record, SqlValue};
use crate::error::Result;
use crate::mapping::LookupKeyConfig;
use crate::source::SourcePool;
use crate::target::TargetPool;
use crate::transform::IdentifierMap;

/// Source key to destination identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupMap {
    entries: HashMap<String, String>,
}

impl LookupMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert under the trimmed key.
    pub fn insert(&mut self, key: &str, id: impl Into<String>) {
        self.entries.insert(key.trim().to_string(), id.into());
    }

    /// Resolve a raw key: exact trimmed match first, then its upper-cased form.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        let key = key.trim();
        self.entries
            .get(key)
            .or_else(|| self.entries.get(&key.to_uppercase()))
            .map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }
}

impl FromIterator<(String, String)> for LookupMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = LookupMap::new();
        for (key, id) in iter {
            map.insert(&key, id);
        }
        map
    }
}

impl From<&IdentifierMap> for LookupMap {
    fn from(ids: &IdentifierMap) -> Self {
        ids.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Lookup maps by name, including alias names for each destination table.
#[derive(Debug, Clone, Default)]
pub struct LookupRegistry {
    maps: HashMap<String, LookupMap>,
}

impl LookupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a destination table's map under its name, its singular form
    /// and its underscore-stripped form.
    pub fn register(&mut self, destination_table: &str, map: LookupMap) {
        for alias in aliases(destination_table) {
            self.maps.insert(alias, map.clone());
        }
    }

    /// Register a map under exactly one name.
    pub fn register_named(&mut self, name: &str, map: LookupMap) {
        self.maps.insert(name.to_string(), map);
    }

    pub fn get(&self, name: &str) -> Option<&LookupMap> {
        self.maps.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.maps.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.maps.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

fn aliases(destination_table: &str) -> Vec<String> {
    let mut names = vec![destination_table.to_string()];
    let candidates = [
        destination_table.strip_suffix('s').map(str::to_string),
        Some(destination_table.replace('_', "")),
    ];
    for name in candidates.into_iter().flatten() {
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Entries produced for one reference table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupStats {
    pub table: String,
    pub entries: usize,
    pub alternate_entries: usize,
}

/// Build the lookup maps for one table and register them.
///
/// Destination rows are keyed by the configured natural key, and by the
/// upper-cased alternate key when one is configured. Each source record's
/// natural key is then resolved through those maps, so only keys present on
/// both sides make it into the registry.
pub async fn build_lookup(
    source: &dyn SourcePool,
    target: &dyn TargetPool,
    config: &LookupKeyConfig,
    registry: &mut LookupRegistry,
) -> Result<LookupStats> {
    let mut columns = vec!["id", config.destination_key.as_str()];
    if let Some(alt) = &config.alternate {
        columns.push(alt.destination_key.as_str());
    }

    let dest_rows = target
        .select_columns(&config.destination_table, &columns)
        .await?;

    let by_key = index_rows(&dest_rows, &config.destination_key, false);
    let by_alt = config
        .alternate
        .as_ref()
        .map(|alt| index_rows(&dest_rows, &alt.destination_key, true));

    let source_rows = source.fetch_all(&config.source_table, None).await?;

    let mut map = LookupMap::new();
    let mut alt_map = LookupMap::new();
    for row in &source_rows {
        if let Some(key) = row.get(&config.source_key).and_then(SqlValue::key_string) {
            if let Some(id) = by_key.get(&key) {
                map.insert(&key, id.clone());
            }
        }

        if let (Some(alt), Some(by_alt)) = (&config.alternate, &by_alt) {
            if let Some(key) = row.get(&alt.source_key).and_then(SqlValue::key_string) {
                let key = key.to_uppercase();
                if let Some(id) = by_alt.get(&key) {
                    alt_map.insert(&key, id.clone());
                }
            }
        }
    }

    if map.is_empty() && !source_rows.is_empty() {
        warn!(
            "No {} keys matched between {} and {}",
            config.source_key, config.source_table, config.destination_table
        );
    }

    let stats = LookupStats {
        table: config.destination_table.clone(),
        entries: map.len(),
        alternate_entries: alt_map.len(),
    };

    registry.register(&config.destination_table, map);
    if let Some(alt) = &config.alternate {
        debug!("Registered {} entries under {}", alt_map.len(), alt.name);
        registry.register_named(&alt.name, alt_map);
    }

    info!(
        "Built lookup for {}: {} entries ({} source, {} destination rows)",
        config.destination_table,
        stats.entries,
        source_rows.len(),
        dest_rows.len()
    );
    Ok(stats)
}

/// Destination key to identifier, skipping rows without either.
fn index_rows(rows: &[Record], key_column: &str, upper: bool) -> HashMap<String, String> {
    rows.iter()
        .filter_map(|row| {
            let key = row.get(key_column)?.key_string()?;
            let id = row.get("id")?.key_string()?;
            let key = if upper { key.to_uppercase() } else { key };
            Some((key, id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_exact_then_uppercase() {
        let map: LookupMap = [
            ("Acme".to_string(), "id-1".to_string()),
            ("BETA".to_string(), "id-2".to_string()),
        ]
        .into_iter()
        .collect();

        assert_eq!(map.resolve("Acme"), Some("id-1"));
        assert_eq!(map.resolve("  Acme "), Some("id-1"));
        assert_eq!(map.resolve("beta"), Some("id-2"));
        assert_eq!(map.resolve("ACME"), None);
    }

    #[test]
    fn test_insert_trims_keys() {
        let mut map = LookupMap::new();
        map.insert("  Gamma ", "id-3");
        assert!(map.contains_key("Gamma"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_register_adds_aliases() {
        let mut registry = LookupRegistry::new();
        let map: LookupMap = [("Acme".to_string(), "id-1".to_string())]
            .into_iter()
            .collect();
        registry.register("yarn_types", map);

        assert_eq!(registry.names(), vec!["yarn_type", "yarn_types", "yarntypes"]);
        assert_eq!(
            registry.get("yarn_type").and_then(|m| m.resolve("Acme")),
            Some("id-1")
        );
    }

    #[test]
    fn test_register_without_plural_or_underscore() {
        let mut registry = LookupRegistry::new();
        registry.register("users", LookupMap::new());
        assert_eq!(registry.names(), vec!["user", "users"]);

        let mut registry = LookupRegistry::new();
        registry.register("fabric_quality", LookupMap::new());
        assert_eq!(registry.names(), vec!["fabric_quality", "fabricquality"]);
    }

    #[test]
    fn test_from_identifier_map() {
        let mut ids = IdentifierMap::new();
        let id = crate::transform::transform_identifier(&SqlValue::from("SR-1"), Some(&mut ids));
        let map = LookupMap::from(&ids);
        assert_eq!(map.resolve("SR-1"), Some(id.as_str()));
    }

    #[test]
    fn test_index_rows_skips_incomplete() {
        let rows: Vec<Record> = vec![
            [
                ("id".to_string(), SqlValue::from("id-1")),
                ("name".to_string(), SqlValue::from("Acme ")),
            ]
            .into_iter()
            .collect(),
            [("id".to_string(), SqlValue::from("id-2"))].into_iter().collect(),
        ];
        let index = index_rows(&rows, "name", true);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("ACME").map(String::as_str), Some("id-1"));
    }
}
