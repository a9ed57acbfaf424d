//! CLI integration tests for access-pg-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes for configuration errors, and the state commands that
//! work without a database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;

/// Get a command for the access-pg-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("access-pg-migrate").unwrap()
}

/// Write a valid config pointing at `state_file` into `dir`.
fn write_config(dir: &Path, state_file: &Path) -> std::path::PathBuf {
    let path = dir.join("config.yaml");
    let yaml = format!(
        r#"
source:
  path: {source}
target:
  host: localhost
  database: textile
  user: migrator
  password: secret
migration:
  state_file: {state}
"#,
        source = dir.join("production.mdb").display(),
        state = state_file.display()
    );
    std::fs::write(&path, yaml).unwrap();
    path
}

const STATE_JSON: &str = r#"{
  "version": "1.0",
  "started_at": "2026-01-05T09:00:00Z",
  "last_updated": "2026-01-05T09:10:00Z",
  "tables": {
    "customers": {
      "status": "completed",
      "records_migrated": 3,
      "started_at": "2026-01-05T09:00:00Z",
      "completed_at": "2026-01-05T09:01:00Z",
      "last_updated": "2026-01-05T09:01:00Z",
      "error": null,
      "checksum": null
    },
    "users": {
      "status": "failed",
      "records_migrated": 0,
      "started_at": "2026-01-05T09:02:00Z",
      "completed_at": null,
      "last_updated": "2026-01-05T09:02:00Z",
      "error": "connection reset",
      "checksum": null
    }
  }
}"#;

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("reset"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn test_reset_subcommand_help() {
    cmd()
        .args(["reset", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--all"));
}

#[test]
fn test_inspect_output_dir_default() {
    cmd()
        .args(["inspect", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-dir"))
        .stdout(predicate::str::contains("[default: reports]"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("access-pg-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--state-file"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "status"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "status"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "status"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_target_database_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  path: production.mdb").unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(file, "  host: localhost").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "status"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("database"));
}

#[test]
fn test_missing_source_file_fails_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &dir.path().join("state.json"));

    cmd()
        .args(["--config", config.to_str().unwrap(), "health-check"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Access database not found"))
        .stdout(predicate::str::contains("UNHEALTHY"));
}

#[test]
fn test_reset_requires_table_or_all() {
    cmd()
        .args(["reset"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--table"));
}

// =============================================================================
// State Commands
// =============================================================================

#[test]
fn test_status_without_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &dir.path().join("state.json"));

    cmd()
        .args(["--config", config.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tables tracked: 0"));
}

#[test]
fn test_status_reports_tables() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    std::fs::write(&state, STATE_JSON).unwrap();
    let config = write_config(dir.path(), &state);

    cmd()
        .args(["--config", config.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Completed: 1"))
        .stdout(predicate::str::contains("Failed: 1"))
        .stdout(predicate::str::contains("connection reset"));
}

#[test]
fn test_status_output_json() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    std::fs::write(&state, STATE_JSON).unwrap();
    let config = write_config(dir.path(), &state);

    let output = cmd()
        .args(["--config", config.to_str().unwrap(), "--output-json", "status"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["total_tables"], 2);
    assert_eq!(summary["records_migrated"], 3);
}

#[test]
fn test_state_file_flag_overrides_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &dir.path().join("unused.json"));
    let state = dir.path().join("other.json");
    std::fs::write(&state, STATE_JSON).unwrap();

    cmd()
        .args([
            "--config",
            config.to_str().unwrap(),
            "--state-file",
            state.to_str().unwrap(),
            "status",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tables tracked: 2"));
}

#[test]
fn test_reset_single_table() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    std::fs::write(&state, STATE_JSON).unwrap();
    let config = write_config(dir.path(), &state);

    cmd()
        .args(["--config", config.to_str().unwrap(), "reset", "--table", "customers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset state for customers"));

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&state).unwrap()).unwrap();
    assert_eq!(saved["tables"]["customers"]["status"], "pending");
    assert_eq!(saved["tables"]["users"]["status"], "failed");
}

#[test]
fn test_reset_all() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    std::fs::write(&state, STATE_JSON).unwrap();
    let config = write_config(dir.path(), &state);

    cmd()
        .args(["--config", config.to_str().unwrap(), "reset", "--all"])
        .assert()
        .success();

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&state).unwrap()).unwrap();
    assert!(saved["tables"].as_object().unwrap().is_empty());
}
