//! # access-pg-migrate
//!
//! Resumable migration of a legacy MS Access production database into
//! PostgreSQL.
//!
//! The library provides:
//!
//! - **Source readers** for `.mdb`/`.accdb` files through mdbtools or ODBC
//! - **Field transforms** that clean legacy values and resolve foreign keys
//!   through natural-key lookup maps
//! - **Dependency-ordered migration** with per-record duplicate absorption
//! - **Resume capability** via a JSON state file
//! - **Schema validation** before the run and **verification** after it
//!
//! ## Example
//!
//! ```rust,no_run
//! use access_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> access_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut orchestrator = Orchestrator::connect(config).await?;
//!     let result = orchestrator.run().await?;
//!     println!("Migrated {} records", result.records_migrated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod inspect;
pub mod lookup;
pub mod mapping;
pub mod orchestrator;
pub mod preflight;
pub mod source;
pub mod state;
pub mod target;
pub mod transform;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceBackend, SourceConfig, TargetConfig};
pub use crate::core::{Record, SqlValue, TableSchema, TransformedRecord};
pub use error::{MigrateError, Result};
pub use lookup::{LookupMap, LookupRegistry};
pub use mapping::MappingCatalog;
pub use orchestrator::{health_check, HealthCheckResult, MigrationResult, Orchestrator};
pub use source::SourcePool;
pub use state::{StateStore, TableStatus};
pub use target::{PgPool, TargetPool};
pub use verify::{MigrationVerifier, VerificationReport};
