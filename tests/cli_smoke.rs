//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn help_lists_batch_commands() {
    let mut cmd = cargo_bin_cmd!("stackfleet");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("rolling-update"))
        .stdout(predicate::str::contains("batch-launch"));
}

#[test]
fn health_without_servers_is_a_usage_error() {
    let mut cmd = cargo_bin_cmd!("stackfleet");
    cmd.arg("health")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SERVER"));
}

#[test]
fn missing_password_fails_before_contacting_the_cloud() {
    let dir = tempfile::TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let mut cmd = cargo_bin_cmd!("stackfleet");
    cmd.current_dir(dir.path())
        .env_remove("OS_PASSWORD")
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env("STACKFLEET_CONFIG_PATH", dir.path().join("absent.toml"))
        .args(["health", "web-1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("configuration"));
}
