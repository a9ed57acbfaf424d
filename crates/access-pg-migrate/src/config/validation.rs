//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.path.trim().is_empty() {
        return Err(MigrateError::Config("source.path is required".into()));
    }

    // Target validation; a connection string stands in for the discrete fields
    if config.target.connection_string.is_none() {
        if config.target.host.is_empty() {
            return Err(MigrateError::Config("target.host is required".into()));
        }
        if config.target.database.is_empty() {
            return Err(MigrateError::Config("target.database is required".into()));
        }
        if config.target.user.is_empty() {
            return Err(MigrateError::Config("target.user is required".into()));
        }
    }

    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if config.validation.sample_records == 0 {
        return Err(MigrateError::Config(
            "validation.sample_records must be at least 1".into(),
        ));
    }

    Ok(())
}
