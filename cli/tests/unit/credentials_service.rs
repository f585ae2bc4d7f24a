//! Key authorization and agent deployment.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;

use fleetvpn_cli::application::gate::InMemoryGate;
use fleetvpn_cli::application::ports::OperationGate;
use fleetvpn_cli::application::services::credentials::generate_ssh_key;
use fleetvpn_cli::application::services::deploy::deploy_agent;
use fleetvpn_cli::domain::{OrchestrationError, ScopedCredential};
use fleetvpn_common::{AgentCommand, AgentResult, AuthorizedKey, KeyType};
use secrecy::{ExposeSecret, SecretString};

use crate::helpers::{ok_with, server};
use crate::mocks::{BrokenKeyGenerator, FakeKeyGenerator, FixedDigestInstaller, ScriptedTransport};

fn password(s: &str) -> ScopedCredential {
    ScopedCredential::password(SecretString::new(s.to_string()))
}

fn authorized(public_key: &str, already_present: bool) -> AgentResult {
    ok_with(
        "Key authorized",
        &AuthorizedKey {
            public_key: public_key.to_string(),
            key_type: KeyType::Ed25519,
            already_present,
        },
    )
}

// ── generate-ssh-key ──────────────────────────────────────────────────────────

#[tokio::test]
async fn generated_key_is_authorized_with_the_one_shot_password() {
    let transport =
        ScriptedTransport::new().then(authorized("ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFakeKeyBody", false));
    let gate = InMemoryGate::new();

    let key = generate_ssh_key(
        &transport,
        &FakeKeyGenerator,
        &gate,
        &server(),
        password("hunter2"),
        KeyType::Ed25519,
    )
    .await
    .unwrap();

    assert_eq!(transport.passwords_seen(), vec!["hunter2".to_string()]);
    assert!(key.public_key.starts_with("ssh-ed25519 "));
    assert!(key.public_key.ends_with("fleetvpn@fra-1"));
    assert!(!key.private_key.expose_secret().is_empty());
    assert!(!key.already_present);
    match transport.calls().as_slice() {
        [AgentCommand::AuthorizeKey(params)] => {
            assert_eq!(params.public_key, key.public_key);
            assert_eq!(params.key_type, KeyType::Ed25519);
        }
        other => panic!("expected one authorize-key call, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_password_is_rejected_before_contact() {
    let transport = ScriptedTransport::new();
    let gate = InMemoryGate::new();

    let err = generate_ssh_key(
        &transport,
        &FakeKeyGenerator,
        &gate,
        &server(),
        password(""),
        KeyType::Ed25519,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, OrchestrationError::Validation(_)));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn key_generation_failure_sends_nothing() {
    let transport = ScriptedTransport::new();
    let gate = InMemoryGate::new();

    let err = generate_ssh_key(
        &transport,
        &BrokenKeyGenerator,
        &gate,
        &server(),
        password("hunter2"),
        KeyType::Rsa,
    )
    .await
    .unwrap_err();

    match err {
        OrchestrationError::KeyGeneration(reason) => assert!(reason.contains("entropy")),
        other => panic!("expected key generation error, got {other:?}"),
    }
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn rejected_authorization_is_an_agent_error() {
    let transport = ScriptedTransport::new()
        .then(AgentResult::failed("Authorize failed", "authorized_keys is read-only"));
    let gate = InMemoryGate::new();

    let err = generate_ssh_key(
        &transport,
        &FakeKeyGenerator,
        &gate,
        &server(),
        password("hunter2"),
        KeyType::Ed25519,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, OrchestrationError::Agent { .. }));
    assert_eq!(err.status_hint(), None);
}

// ── deploy-agent ──────────────────────────────────────────────────────────────

const DIGEST: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

#[tokio::test]
async fn matching_digest_is_accepted_in_any_case() {
    let installer = FixedDigestInstaller(DIGEST);
    let gate = InMemoryGate::new();

    let remote = deploy_agent(
        &installer,
        &gate,
        &server(),
        Path::new("target/release/fleetvpn-agent"),
        &DIGEST.to_uppercase(),
    )
    .await
    .unwrap();

    assert_eq!(remote, DIGEST);
}

#[tokio::test]
async fn digest_mismatch_is_an_integrity_error() {
    let installer = FixedDigestInstaller(DIGEST);
    let gate = InMemoryGate::new();

    let err = deploy_agent(
        &installer,
        &gate,
        &server(),
        Path::new("target/release/fleetvpn-agent"),
        "0000000000000000000000000000000000000000000000000000000000000000",
    )
    .await
    .unwrap_err();

    match err {
        OrchestrationError::Integrity { actual, .. } => assert_eq!(actual, DIGEST),
        other => panic!("expected integrity error, got {other:?}"),
    }
}

#[tokio::test]
async fn deploy_waits_for_no_one() {
    let installer = FixedDigestInstaller(DIGEST);
    let gate = InMemoryGate::new();
    let srv = server();
    let _client_op = gate.try_shared(&srv.id).unwrap();

    let err = deploy_agent(&installer, &gate, &srv, Path::new("agent"), DIGEST)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::Busy(_)));
}
