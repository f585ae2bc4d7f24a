//! Argument parsing, help output, and refusals that happen before contact.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

pub fn fleetvpn(home: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("fleetvpn"));
    cmd.env("NO_COLOR", "1")
        .env("FLEETVPN_HOME", home.path())
        .env_remove("FLEETVPN_CONFIG")
        .env_remove("FLEETVPN_SSH_PASSWORD")
        .env("CI", "1");
    cmd
}

pub fn json_stdout(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be one JSON document")
}

/// A home with one password-auth server, `fra-1`.
pub fn home_with_server() -> TempDir {
    let home = TempDir::new().unwrap();
    fleetvpn(&home)
        .args(["server", "add", "fra-1", "203.0.113.7"])
        .assert()
        .success();
    home
}

// --- Help and version ---

#[test]
fn no_args_shows_help() {
    let home = TempDir::new().unwrap();
    fleetvpn(&home)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Manage a fleet of OpenVPN servers"));
}

#[test]
fn help_lists_the_commands() {
    let home = TempDir::new().unwrap();
    fleetvpn(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("reinstall"))
        .stdout(predicate::str::contains("generate-ssh-key"))
        .stdout(predicate::str::contains("monitor"));
}

#[test]
fn version_flag_names_the_binary() {
    let home = TempDir::new().unwrap();
    fleetvpn(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("fleetvpn "));
}

#[test]
fn unknown_protocol_is_a_usage_error() {
    let home = TempDir::new().unwrap();
    fleetvpn(&home)
        .args(["configure", "fra-1", "--protocol", "sctp"])
        .assert()
        .code(2);
}

// --- Refusals before contact ---

#[test]
fn invalid_client_name_is_rejected_without_ssh() {
    let home = home_with_server();
    let output = fleetvpn(&home)
        .args(["--json", "client", "create", "fra-1", "bad name;rm"])
        .assert()
        .failure()
        .get_output()
        .clone();

    let body = json_stdout(&output);
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], "validation");
}

#[test]
fn reinstall_without_confirmation_is_refused_non_interactively() {
    let home = home_with_server();
    let output = fleetvpn(&home)
        .args(["--json", "reinstall", "fra-1"])
        .assert()
        .failure()
        .get_output()
        .clone();

    assert_eq!(json_stdout(&output)["code"], "not-confirmed");
}

#[test]
fn unknown_server_is_not_found() {
    let home = TempDir::new().unwrap();
    let output = fleetvpn(&home)
        .args(["--json", "status", "nowhere"])
        .assert()
        .failure()
        .get_output()
        .clone();

    assert_eq!(json_stdout(&output)["code"], "not-found");
}

#[test]
fn human_errors_go_to_stderr() {
    let home = TempDir::new().unwrap();
    fleetvpn(&home)
        .args(["status", "nowhere"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn revoking_an_unrecorded_client_is_not_found() {
    let home = home_with_server();
    let output = fleetvpn(&home)
        .args(["--json", "client", "revoke", "fra-1", "ghost"])
        .assert()
        .failure()
        .get_output()
        .clone();

    assert_eq!(json_stdout(&output)["code"], "not-found");
}

// --- Fleet monitor ---

#[test]
fn monitor_once_skips_servers_that_were_never_installed() {
    let home = home_with_server();
    let output = fleetvpn(&home)
        .args(["--json", "monitor", "--once"])
        .assert()
        .success()
        .get_output()
        .clone();

    let sweep = json_stdout(&output);
    assert_eq!(sweep["success"], true);
    assert!(sweep["checked_at"].is_string());
    assert_eq!(sweep["servers"].as_array().unwrap().len(), 0);
}

#[test]
fn monitor_interval_must_be_positive() {
    let home = TempDir::new().unwrap();
    fleetvpn(&home)
        .args(["monitor", "--interval", "0"])
        .assert()
        .code(2);
}
