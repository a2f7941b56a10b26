//! End-to-end tests for the `westport` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn westport(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("westport").unwrap();
    cmd.env("WESTPORT_SETTINGS", dir.join("settings.json"))
        .env("WESTPORT_CONFIG", dir.join("westport.toml"))
        .env_remove("WESTPORT_PASSPHRASE");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    westport(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("start"));
}

#[test]
fn test_install_then_add() {
    let dir = tempfile::tempdir().unwrap();

    westport(dir.path())
        .env("WESTPORT_PASSPHRASE", "hunter2")
        .args(["install", "--zone", "west.example.com", "--email", "ops@example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.10.10.1"));

    westport(dir.path())
        .env("WESTPORT_PASSPHRASE", "hunter2")
        .args(["install", "--zone", "west.example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already installed"));

    let token = westport(dir.path())
        .env("WESTPORT_PASSPHRASE", "hunter2")
        .args(["add", "--name", "alpha", "--ip", "10.10.10.5"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(token).unwrap().trim().split('.').count(), 3);

    westport(dir.path())
        .env("WESTPORT_PASSPHRASE", "hunter2")
        .args(["add", "--name", "beta", "--ip", "192.168.0.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside network"));
}

#[test]
fn test_passphrase_required() {
    let dir = tempfile::tempdir().unwrap();
    westport(dir.path())
        .args(["install", "--zone", "west.example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("WESTPORT_PASSPHRASE"));
}

#[test]
fn test_wrong_passphrase_rejected() {
    let dir = tempfile::tempdir().unwrap();
    westport(dir.path())
        .env("WESTPORT_PASSPHRASE", "hunter2")
        .args(["install", "--zone", "west.example.com"])
        .assert()
        .success();

    westport(dir.path())
        .env("WESTPORT_PASSPHRASE", "wrong")
        .args(["add", "--name", "alpha", "--ip", "10.10.10.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("authentication"));
}
