//! Migration orchestrator - main workflow coordinator.
//!
//! A run moves through fixed phases: connect, validate schemas, build lookup
//! maps (migrating reference tables on the way), migrate the remaining tables
//! in dependency order, summarize. Tables run one at a time and records one
//! at a time; batches only pace progress logging and checkpoints.

mod record;

pub use record::source_checksum;

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::{Record, TableSchema, TransformedRecord};
use crate::error::{MigrateError, Result};
use crate::lookup::{build_lookup, LookupMap, LookupRegistry};
use crate::mapping::{MappingCatalog, TableMapping};
use crate::preflight::SchemaValidator;
use crate::source::{self, SourcePool};
use crate::state::{StateStore, TableUpdate};
use crate::target::{PgPool, TargetPool};
use crate::transform::{apply_transformations, IdentifierMap, TransformContext};
use record::{apply_defaults, ensure_identifier, missing_required, stamp_timestamps};

/// Batches between mid-table checkpoints.
const CHECKPOINT_EVERY_BATCHES: usize = 10;

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    catalog: MappingCatalog,
    source: Box<dyn SourcePool>,
    target: Box<dyn TargetPool>,
    state: StateStore,
    lookups: LookupRegistry,

    /// Identifier reuse maps by destination table, kept for the run.
    identifier_maps: HashMap<String, IdentifierMap>,

    /// Source tables already handled in this run.
    processed: HashSet<String>,
    outcomes: Vec<TableOutcome>,
}

/// What happened to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// The row already existed; nothing was written.
    Duplicate,
    /// Dry run: prepared but not written.
    Planned,
}

/// Final state of one table in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRunStatus {
    Completed,
    Failed,
    Skipped,
}

/// Per-table result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableOutcome {
    pub source_table: String,
    pub destination_table: String,
    pub status: TableRunStatus,
    pub records_read: u64,
    pub records_migrated: u64,
    pub duplicates: u64,
    pub errors: u64,
    pub error: Option<String>,
    pub duration_seconds: f64,
}

impl TableOutcome {
    fn new(mapping: &TableMapping, status: TableRunStatus) -> Self {
        Self {
            source_table: mapping.source_table.clone(),
            destination_table: mapping.destination_table.clone(),
            status,
            records_read: 0,
            records_migrated: 0,
            duplicates: 0,
            errors: 0,
            error: None,
            duration_seconds: 0.0,
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: `completed` or `failed`.
    pub status: String,

    pub dry_run: bool,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    pub duration_seconds: f64,

    pub tables_total: usize,
    pub tables_completed: usize,
    pub tables_failed: usize,
    pub tables_skipped: usize,

    /// Records written (or planned, in a dry run).
    pub records_migrated: u64,

    pub failed_tables: Vec<String>,

    pub tables: Vec<TableOutcome>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_success(&self) -> bool {
        self.tables_failed == 0
    }
}

/// Connection test results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_backend: Option<String>,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Insert one prepared record, absorbing duplicate-key collisions.
pub async fn insert_transformed(
    target: &dyn TargetPool,
    table: &str,
    record: &TransformedRecord,
) -> Result<RecordOutcome> {
    match target.insert_record(table, record).await {
        Ok(_) => Ok(RecordOutcome::Inserted),
        Err(e) if e.is_duplicate_key() => {
            debug!("{}: record {:?} already present", table, record.id());
            Ok(RecordOutcome::Duplicate)
        }
        Err(e) => Err(e),
    }
}

impl Orchestrator {
    /// Connect to the configured source and target.
    pub async fn connect(config: Config) -> Result<Self> {
        let source = source::connect(&config.source).await?;
        let target = PgPool::new(&config.target).await?;
        Ok(Self::with_pools(config, source, Box::new(target)))
    }

    /// Build an orchestrator over already-open pools.
    pub fn with_pools(
        config: Config,
        source: Box<dyn SourcePool>,
        target: Box<dyn TargetPool>,
    ) -> Self {
        let state = StateStore::open(&config.migration.state_file);
        Self {
            config,
            catalog: MappingCatalog::standard(),
            source,
            target,
            state,
            lookups: LookupRegistry::new(),
            identifier_maps: HashMap::new(),
            processed: HashSet::new(),
            outcomes: Vec::new(),
        }
    }

    /// Replace the mapping catalog.
    pub fn with_catalog(mut self, catalog: MappingCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn lookups(&self) -> &LookupRegistry {
        &self.lookups
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Run the migration. Both pools are closed afterwards, on success or failure.
    pub async fn run(&mut self) -> Result<MigrationResult> {
        let result = self.run_phases().await;
        self.source.close().await;
        self.target.close().await;
        if let Err(e) = &result {
            error!("Migration aborted: {}", e);
        }
        result
    }

    async fn run_phases(&mut self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let dry_run = self.config.migration.dry_run;
        let force = self.config.migration.force;

        info!(
            "Starting migration run {}{}",
            run_id,
            if dry_run { " (dry run)" } else { "" }
        );

        info!(
            "Phase 1: Connecting ({} source, {} target)",
            self.source.db_type(),
            self.target.db_type()
        );
        let validator = SchemaValidator::new(
            self.source.as_ref(),
            self.target.as_ref(),
            &self.catalog,
            self.config.validation.sample_records,
        );
        validator.validate_connections().await?;

        let plan = self.plan()?;
        info!("Planned {} table(s): {}", plan.len(), plan.join(", "));

        if self.config.validation.check_schema {
            info!("Phase 2: Validating schemas");
            let report = validator.validate_tables(&plan).await;
            if !report.valid {
                return Err(MigrateError::SchemaValidation(report.error_summary()));
            }
        } else {
            info!("Phase 2: Schema validation disabled");
        }

        if force && !dry_run {
            info!("Force: resetting all table state");
            self.state.reset_all()?;
        }

        info!("Phase 3: Building lookup maps");
        self.build_lookups(&plan).await?;

        info!("Phase 4: Migrating tables");
        if !dry_run {
            self.state.start_migration()?;
        }
        for table in &plan {
            if self.processed.contains(table) {
                debug!("{} already handled in the lookup phase", table);
                continue;
            }
            self.migrate_and_index(table).await?;
        }

        info!("Phase 5: Summary");
        let result = self.summarize(run_id, started_at, dry_run);
        info!(
            "Migration {}: {}/{} tables completed, {} skipped, {} failed, {} records in {:.1}s",
            result.status,
            result.tables_completed,
            result.tables_total,
            result.tables_skipped,
            result.tables_failed,
            result.records_migrated,
            result.duration_seconds
        );
        Ok(result)
    }

    /// The selected tables, in migration order.
    fn plan(&self) -> Result<Vec<String>> {
        let selection = self.catalog.resolve_tables(&self.config.migration.tables);
        for name in &selection.unknown {
            warn!("No mapping for configured table {}, ignoring it", name);
        }
        if selection.tables.is_empty() {
            return Err(MigrateError::Config(
                "migration.tables selects no mapped table".to_string(),
            ));
        }

        Ok(selection.tables)
    }

    /// Migrate or rehydrate the selected reference tables, then rehydrate
    /// lookups for every other keyed table whose destination exists.
    async fn build_lookups(&mut self, plan: &[String]) -> Result<()> {
        let dest_tables: HashSet<String> = match self.target.list_tables().await {
            Ok(tables) => tables.into_iter().collect(),
            Err(e) => {
                warn!("Could not list destination tables: {}", e);
                HashSet::new()
            }
        };

        let reference_tables = self.catalog.reference_tables().to_vec();
        for table in &reference_tables {
            let dest = self.catalog.destination_table_name(table);
            if !plan.contains(table) {
                self.rehydrate(table, &dest, &dest_tables).await;
            } else if self.state.should_skip(&dest, self.config.migration.force) {
                info!("{} already migrated, rehydrating its lookup", table);
                self.record_skip(table);
                self.index_table(table).await;
            } else {
                self.migrate_and_index(table).await?;
            }
        }

        let mut outside_plan: Vec<(String, String)> = self
            .catalog
            .lookup_keys()
            .iter()
            .filter(|l| !plan.contains(&l.source_table))
            .filter(|l| !self.catalog.is_reference_table(&l.source_table))
            .map(|l| (l.source_table.clone(), l.destination_table.clone()))
            .collect();
        outside_plan.dedup();
        for (table, dest) in &outside_plan {
            self.rehydrate(table, dest, &dest_tables).await;
        }

        info!("Lookup maps ready: {}", self.lookups.names().join(", "));
        Ok(())
    }

    /// Build the lookup of an unselected table from rows already in the
    /// destination. The table itself is never migrated or validated.
    async fn rehydrate(&mut self, table: &str, dest: &str, dest_tables: &HashSet<String>) {
        if dest_tables.contains(dest) {
            debug!("Rehydrating lookup for {} from the destination", table);
            self.index_table(table).await;
        } else {
            warn!(
                "{} is not selected and {} does not exist; references to it stay unresolved",
                table, dest
            );
        }
    }

    /// Migrate a table, then build its lookup. In strict mode a failed table
    /// aborts the run once its state is recorded.
    async fn migrate_and_index(&mut self, table: &str) -> Result<()> {
        let outcome = self.migrate_table(table).await;
        self.processed.insert(table.to_string());

        let failed = outcome.status == TableRunStatus::Failed;
        let message = outcome.error.clone().unwrap_or_default();
        self.outcomes.push(outcome);

        if failed && self.config.migration.strict_mode {
            return Err(MigrateError::transfer(table, message));
        }
        self.index_table(table).await;
        Ok(())
    }

    /// Build the lookup map for a table, if it has a natural key.
    async fn index_table(&mut self, table: &str) {
        let Some(config) = self.catalog.lookup_key(table).cloned() else {
            if self.catalog.is_reference_table(table) {
                warn!(
                    "No lookup key configured for reference table {}; references to it stay unresolved",
                    table
                );
            }
            return;
        };

        if let Err(e) = build_lookup(
            self.source.as_ref(),
            self.target.as_ref(),
            &config,
            &mut self.lookups,
        )
        .await
        {
            warn!("Could not build lookup for {}: {}", table, e);
        }
    }

    fn record_skip(&mut self, table: &str) {
        self.processed.insert(table.to_string());
        if let Some(mapping) = self.catalog.table(table) {
            let mut outcome = TableOutcome::new(mapping, TableRunStatus::Skipped);
            if let Some(state) = self.state.get(&mapping.destination_table) {
                outcome.records_migrated = state.records_migrated;
            }
            self.outcomes.push(outcome);
        }
    }

    /// Migrate one table. Failures are recorded in state and in the outcome.
    async fn migrate_table(&mut self, source_table: &str) -> TableOutcome {
        let start = Instant::now();
        let dry_run = self.config.migration.dry_run;

        let Some(mapping) = self.catalog.table(source_table).cloned() else {
            warn!("No mapping for {}, skipping", source_table);
            return TableOutcome {
                source_table: source_table.to_string(),
                destination_table: self.catalog.destination_table_name(source_table),
                status: TableRunStatus::Skipped,
                records_read: 0,
                records_migrated: 0,
                duplicates: 0,
                errors: 0,
                error: None,
                duration_seconds: 0.0,
            };
        };
        let dest = mapping.destination_table.clone();

        if self.state.should_skip(&dest, self.config.migration.force) {
            info!("Skipping {} (already completed)", source_table);
            let mut outcome = TableOutcome::new(&mapping, TableRunStatus::Skipped);
            outcome.records_migrated = self
                .state
                .get(&dest)
                .map(|s| s.records_migrated)
                .unwrap_or(0);
            return outcome;
        }

        if mapping.fields.is_empty() {
            warn!("{} has an empty field mapping, skipping", source_table);
            return TableOutcome::new(&mapping, TableRunStatus::Skipped);
        }

        info!("Migrating {} -> {}", source_table, dest);
        let mut outcome = TableOutcome::new(&mapping, TableRunStatus::Completed);
        let copied = self.copy_table(&mapping, &mut outcome).await;

        let recorded = match copied {
            Ok(checksum) => {
                info!(
                    "{}: {} migrated ({} already present), {} error(s)",
                    dest, outcome.records_migrated, outcome.duplicates, outcome.errors
                );
                if dry_run {
                    Ok(())
                } else {
                    self.state
                        .mark_complete(&dest, outcome.records_migrated, checksum)
                }
            }
            Err(e) => {
                error!("{} failed: {}", dest, e);
                outcome.status = TableRunStatus::Failed;
                outcome.error = Some(e.to_string());
                if dry_run {
                    Ok(())
                } else {
                    self.state.mark_failed(&dest, e.to_string())
                }
            }
        };
        if let Err(e) = recorded {
            outcome.status = TableRunStatus::Failed;
            outcome.error = Some(e.to_string());
        }

        outcome.duration_seconds = start.elapsed().as_secs_f64();
        outcome
    }

    /// Read, transform and insert every record. Returns the source checksum.
    async fn copy_table(
        &mut self,
        mapping: &TableMapping,
        outcome: &mut TableOutcome,
    ) -> Result<Option<String>> {
        let dest = mapping.destination_table.as_str();
        let dry_run = self.config.migration.dry_run;
        let strict = self.config.migration.strict_mode;
        let batch_size = self.config.migration.batch_size.max(1);

        let dest_schema = self.target.get_table_schema(dest).await?;
        let count = self.source.get_record_count(&mapping.source_table).await?;
        if count == 0 {
            info!("{} is empty", mapping.source_table);
            return Ok(None);
        }

        if !dry_run {
            self.state.mark_in_progress(dest)?;
        }

        let records = self.source.fetch_all(&mapping.source_table, None).await?;
        outcome.records_read = records.len() as u64;
        let checksum = source_checksum(&records);

        let mut ids = self.identifier_maps.remove(dest).unwrap_or_default();
        let total_batches = records.len().div_ceil(batch_size);
        let mut failure = None;

        'batches: for (batch_no, batch) in records.chunks(batch_size).enumerate() {
            for record in batch {
                match self.migrate_record(mapping, record, &dest_schema, &mut ids).await {
                    Ok(RecordOutcome::Inserted | RecordOutcome::Planned) => {
                        outcome.records_migrated += 1
                    }
                    Ok(RecordOutcome::Duplicate) => {
                        outcome.records_migrated += 1;
                        outcome.duplicates += 1;
                    }
                    Err(e) => {
                        outcome.errors += 1;
                        warn!("{}: record rejected: {}", dest, e);
                        if strict {
                            failure = Some(e);
                            break 'batches;
                        }
                    }
                }
            }

            debug!(
                "{}: batch {}/{} done ({} records)",
                dest,
                batch_no + 1,
                total_batches,
                outcome.records_migrated
            );
            if !dry_run && (batch_no + 1) % CHECKPOINT_EVERY_BATCHES == 0 {
                self.state.update(
                    dest,
                    TableUpdate::default().records(outcome.records_migrated),
                )?;
            }
        }

        if mapping.reuses_identifiers() {
            self.lookups.register(dest, LookupMap::from(&ids));
        }
        self.identifier_maps.insert(dest.to_string(), ids);

        if let Some(e) = failure {
            if !dry_run {
                self.state.update(
                    dest,
                    TableUpdate::default().records(outcome.records_migrated),
                )?;
            }
            return Err(e);
        }
        Ok(Some(checksum))
    }

    async fn migrate_record(
        &self,
        mapping: &TableMapping,
        record: &Record,
        dest_schema: &TableSchema,
        ids: &mut IdentifierMap,
    ) -> Result<RecordOutcome> {
        let mut ctx = TransformContext::new(&self.lookups).with_identifiers(ids);
        let mut row = apply_transformations(mapping, record, &mut ctx);

        ensure_identifier(&mut row);
        apply_defaults(mapping, &mut row, record);
        stamp_timestamps(&mut row, dest_schema);

        let missing = missing_required(mapping, &row);
        if !missing.is_empty() {
            return Err(MigrateError::Statement(format!(
                "null value for required column(s): {}",
                missing.join(", ")
            )));
        }

        if self.config.migration.dry_run {
            return Ok(RecordOutcome::Planned);
        }
        insert_transformed(self.target.as_ref(), &mapping.destination_table, &row).await
    }

    fn summarize(&self, run_id: String, started_at: DateTime<Utc>, dry_run: bool) -> MigrationResult {
        let completed_at = Utc::now();
        let count = |status| self.outcomes.iter().filter(|o| o.status == status).count();

        let failed_tables: Vec<String> = self
            .outcomes
            .iter()
            .filter(|o| o.status == TableRunStatus::Failed)
            .map(|o| o.destination_table.clone())
            .collect();
        let records_migrated = self
            .outcomes
            .iter()
            .filter(|o| o.status == TableRunStatus::Completed)
            .map(|o| o.records_migrated)
            .sum();

        MigrationResult {
            run_id,
            status: if failed_tables.is_empty() {
                "completed".to_string()
            } else {
                "failed".to_string()
            },
            dry_run,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tables_total: self.outcomes.len(),
            tables_completed: count(TableRunStatus::Completed),
            tables_failed: count(TableRunStatus::Failed),
            tables_skipped: count(TableRunStatus::Skipped),
            records_migrated,
            failed_tables,
            tables: self.outcomes.clone(),
        }
    }
}

/// Open both databases and report what answered.
pub async fn health_check(config: &Config) -> HealthCheckResult {
    let start = Instant::now();
    let (source_connected, source_backend, source_error) = match source::connect(&config.source).await {
        Ok(pool) => {
            let backend = pool.db_type().to_string();
            let listed = pool.list_tables().await;
            pool.close().await;
            match listed {
                Ok(_) => (true, Some(backend), None),
                Err(e) => (false, Some(backend), Some(e.to_string())),
            }
        }
        Err(e) => (false, None, Some(e.to_string())),
    };
    let source_latency_ms = start.elapsed().as_millis() as u64;

    let start = Instant::now();
    let (target_connected, target_error) = match PgPool::new(&config.target).await {
        Ok(pool) => {
            pool.close().await;
            (true, None)
        }
        Err(e) => (false, Some(e.to_string())),
    };
    let target_latency_ms = start.elapsed().as_millis() as u64;

    HealthCheckResult {
        source_connected,
        source_backend,
        source_latency_ms,
        source_error,
        target_connected,
        target_latency_ms,
        target_error,
        healthy: source_connected && target_connected,
    }
}
