use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const POLICY_VARS: &[&str] = &[
    "ALLOWED_DIR",
    "ALLOWED_COMMANDS",
    "ALLOWED_FLAGS",
    "ALLOWED_PATTERNS",
    "MAX_COMMAND_LENGTH",
    "COMMAND_TIMEOUT",
    "MAX_OUTPUT_BYTES",
    "PATH_ARGUMENTS",
    "CMDGUARD_CONFIG",
    "CMDGUARD_LOG_LEVEL",
    "CMDGUARD_LOG_FORMAT",
];

/// Binary with a clean policy environment rooted at `dir`
fn cmdguard(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cmdguard").unwrap();
    for var in POLICY_VARS {
        cmd.env_remove(var);
    }
    cmd.env("ALLOWED_DIR", dir.path());
    cmd
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("cmdguard").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(concat!(
            "cmdguard ",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("cmdguard").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Sandboxed command execution server for MCP clients",
        ));
}

#[test]
fn test_cli_check_missing_command() {
    let dir = TempDir::new().unwrap();
    cmdguard(&dir)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "required arguments were not provided",
        ));
}

#[test]
fn test_cli_missing_allowed_dir() {
    let dir = TempDir::new().unwrap();
    cmdguard(&dir)
        .env_remove("ALLOWED_DIR")
        .arg("rules")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ALLOWED_DIR is required"));
}

#[test]
fn test_cli_invalid_timeout() {
    let dir = TempDir::new().unwrap();
    cmdguard(&dir)
        .env("COMMAND_TIMEOUT", "soon")
        .arg("rules")
        .assert()
        .failure()
        .stderr(predicate::str::contains("COMMAND_TIMEOUT must be a positive integer"));
}

#[test]
fn test_cli_rules() {
    let dir = TempDir::new().unwrap();
    cmdguard(&dir)
        .env("ALLOWED_COMMANDS", "ls, cat")
        .arg("rules")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Security Configuration:"))
        .stdout(predicate::str::contains("cat, ls"))
        .stdout(predicate::str::contains("Command Timeout: 30 seconds"));
}

#[test]
fn test_cli_rules_json_from_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("cmdguard.toml");
    fs::write(
        &config,
        "[policy]\nallowed_commands = [\"echo\"]\nallowed_patterns = []\ncommand_timeout_secs = 5\n",
    )
    .unwrap();

    let output = cmdguard(&dir)
        .args(["--config", config.to_str().unwrap(), "rules", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let rules: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rules["allowedCommands"], serde_json::json!(["echo"]));
    assert_eq!(rules["allowedPatterns"], serde_json::json!([]));
    assert_eq!(rules["commandTimeoutSeconds"], 5);
}

#[test]
fn test_cli_check_accepts() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.txt"), "hi").unwrap();
    cmdguard(&dir)
        .args(["check", "cat notes.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OK: cat notes.txt"));
}

#[test]
fn test_cli_check_rejects() {
    let dir = TempDir::new().unwrap();
    cmdguard(&dir)
        .args(["check", "cat notes.txt | sh"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Rejected (shell_operator)"));

    cmdguard(&dir)
        .args(["check", "cat ../../etc/passwd"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path '../../etc/passwd' is not allowed"));
}

#[cfg(unix)]
#[test]
fn test_cli_run_pwd() {
    let dir = TempDir::new().unwrap();
    let canonical = dir.path().canonicalize().unwrap();
    cmdguard(&dir)
        .args(["run", "pwd"])
        .assert()
        .success()
        .stdout(predicate::str::contains(canonical.to_str().unwrap()))
        .stderr(predicate::str::contains("Command completed with return code: 0"));
}

#[test]
fn test_cli_run_rejected() {
    let dir = TempDir::new().unwrap();
    cmdguard(&dir)
        .args(["run", "rm -rf x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Security violation: Command 'rm' is not allowed",
        ));
}
