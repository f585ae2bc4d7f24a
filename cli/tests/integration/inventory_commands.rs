//! `fleetvpn server` and `fleetvpn client list` against the local inventory.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use predicates::prelude::*;
use tempfile::TempDir;

use crate::cli_tests::{fleetvpn, home_with_server, json_stdout};

#[test]
fn added_server_is_listed_as_unconfigured_password_server() {
    let home = home_with_server();
    let output = fleetvpn(&home)
        .args(["--json", "server", "list"])
        .assert()
        .success()
        .get_output()
        .clone();

    let servers = json_stdout(&output);
    let servers = servers.as_array().unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0]["id"], "fra-1");
    assert_eq!(servers[0]["host"], "203.0.113.7");
    assert_eq!(servers[0]["port"], 22);
    assert_eq!(servers[0]["status"], "unconfigured");
    assert_eq!(servers[0]["auth"], "password");
    assert_eq!(servers[0]["password_login"], true);
    assert_eq!(servers[0]["active_clients"], 0);
}

#[test]
fn duplicate_server_id_is_a_conflict() {
    let home = home_with_server();
    let output = fleetvpn(&home)
        .args(["--json", "server", "add", "fra-1", "198.51.100.9"])
        .assert()
        .failure()
        .get_output()
        .clone();

    assert_eq!(json_stdout(&output)["code"], "conflict");
}

#[test]
fn malformed_host_is_rejected() {
    let home = TempDir::new().unwrap();
    fleetvpn(&home)
        .args(["--json", "server", "add", "fra-1", "bad host;reboot"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"validation\""));
}

#[test]
fn missing_key_file_is_rejected() {
    let home = TempDir::new().unwrap();
    fleetvpn(&home)
        .args(["server", "add", "fra-1", "203.0.113.7", "--key"])
        .arg(home.path().join("absent_ed25519"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn key_server_is_listed_without_password_login() {
    let home = TempDir::new().unwrap();
    let key = home.path().join("id_ed25519");
    std::fs::write(&key, "placeholder").unwrap();
    fleetvpn(&home)
        .args(["server", "add", "fra-1", "203.0.113.7", "--key"])
        .arg(&key)
        .assert()
        .success();

    let output = fleetvpn(&home)
        .args(["--json", "server", "list"])
        .assert()
        .success()
        .get_output()
        .clone();

    let servers = json_stdout(&output);
    assert_eq!(servers[0]["auth"], "key");
    assert_eq!(servers[0]["password_login"], false);
}

#[test]
fn removed_server_is_gone() {
    let home = home_with_server();
    fleetvpn(&home)
        .args(["server", "remove", "fra-1"])
        .assert()
        .success();

    let output = fleetvpn(&home)
        .args(["--json", "server", "list"])
        .assert()
        .success()
        .get_output()
        .clone();
    assert!(json_stdout(&output).as_array().unwrap().is_empty());
}

#[test]
fn local_client_list_starts_empty() {
    let home = home_with_server();
    let output = fleetvpn(&home)
        .args(["--json", "client", "list", "fra-1"])
        .assert()
        .success()
        .get_output()
        .clone();

    assert!(json_stdout(&output).as_array().unwrap().is_empty());
}

#[test]
fn human_list_shows_the_server() {
    let home = home_with_server();
    fleetvpn(&home)
        .args(["server", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fra-1"))
        .stdout(predicate::str::contains("203.0.113.7"));
}
