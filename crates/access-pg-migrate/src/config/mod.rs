//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl TargetConfig {
    /// `host:port/database` for log lines, without credentials.
    pub fn display_name(&self) -> String {
        if self.connection_string.is_some() {
            return "connection string".to_string();
        }
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(
            r#"
source:
  path: data/production.mdb
target:
  database: textile
  user: migrator
  password: secret
"#,
        )
        .unwrap();

        assert_eq!(config.source.backend, SourceBackend::Auto);
        assert_eq!(config.target.host, "localhost");
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.schema, "public");
        assert!(config.migration.tables.is_empty());
        assert_eq!(config.migration.batch_size, 1000);
        assert!(!config.migration.strict_mode);
        assert_eq!(config.migration.state_file, "migration-state.json");
        assert!(config.validation.check_schema);
        assert_eq!(config.validation.sample_records, 10);
        assert_eq!(config.target.display_name(), "localhost:5432/textile");
    }

    #[test]
    fn test_from_yaml_full() {
        let config = Config::from_yaml(
            r#"
source:
  path: /srv/prod.accdb
  backend: mdbtools
target:
  connection_string: "host=db port=5433 dbname=textile user=app"
migration:
  tables: [customers, users]
  batch_size: 250
  strict_mode: true
  state_file: state/run.json
validation:
  sample_records: 5
  report_file: out/report.json
"#,
        )
        .unwrap();

        assert_eq!(config.source.backend, SourceBackend::Mdbtools);
        assert_eq!(config.migration.tables, vec!["customers", "users"]);
        assert_eq!(config.migration.batch_size, 250);
        assert!(config.migration.strict_mode);
        assert_eq!(config.validation.report_file, "out/report.json");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = Config::from_yaml(
            r#"
source:
  path: a.mdb
  backend: jet
target:
  database: d
  user: u
"#,
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG_ERROR);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/config.yaml").unwrap_err();
        assert!(matches!(err, crate::MigrateError::Io(_)));
    }
}
