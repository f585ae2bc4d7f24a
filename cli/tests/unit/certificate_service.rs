//! Client certificate use-cases and record reconciliation.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::Utc;
use fleetvpn_cli::application::gate::InMemoryGate;
use fleetvpn_cli::application::ports::OperationGate;
use fleetvpn_cli::application::services::certificates::{
    create_client, download_config, list_clients, revoke_client,
};
use fleetvpn_cli::application::services::sync::sync_clients;
use fleetvpn_cli::domain::OrchestrationError;
use fleetvpn_common::{AgentCommand, AgentErrorCode, AgentResult, CommandName};
use proptest::prelude::*;

use crate::helpers::{
    created, listing, listing_with_foreign, name, record, revoked_record, server,
};
use crate::mocks::ScriptedTransport;

// ── Create ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_sends_the_server_endpoint_and_returns_a_record() {
    let transport = ScriptedTransport::new().then(created("alice"));
    let gate = InMemoryGate::new();
    let srv = server();

    let issued = create_client(
        &transport,
        &gate,
        &srv,
        &[],
        "alice",
        Some("alice@example.com"),
        Utc::now(),
    )
    .await
    .unwrap();

    assert_eq!(issued.record.name, name("alice"));
    assert!(issued.record.is_active());
    assert_eq!(issued.bundle_path, "/etc/openvpn/clients/alice.ovpn");
    match transport.calls().as_slice() {
        [AgentCommand::CreateClient(params)] => {
            assert_eq!(params.name, name("alice"));
            assert_eq!(params.server_host, srv.host);
            assert_eq!(params.port, srv.vpn_port);
            assert_eq!(params.email.as_deref(), Some("alice@example.com"));
        }
        other => panic!("expected one create-client call, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_active_name_is_rejected_locally() {
    let transport = ScriptedTransport::new();
    let gate = InMemoryGate::new();

    let err = create_client(
        &transport,
        &gate,
        &server(),
        &[record("alice")],
        "alice",
        None,
        Utc::now(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, OrchestrationError::Validation(_)));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn a_revoked_name_can_be_issued_again() {
    let transport = ScriptedTransport::new().then(created("alice"));
    let gate = InMemoryGate::new();

    let issued = create_client(
        &transport,
        &gate,
        &server(),
        &[revoked_record("alice")],
        "alice",
        None,
        Utc::now(),
    )
    .await
    .unwrap();

    assert!(issued.record.is_active());
}

#[tokio::test]
async fn certificate_operations_share_the_server() {
    let gate = InMemoryGate::new();
    let srv = server();

    let _other_create = gate.try_shared(&srv.id).unwrap();
    let transport = ScriptedTransport::new().then(created("alice"));
    create_client(&transport, &gate, &srv, &[], "alice", None, Utc::now())
        .await
        .unwrap();

    assert!(matches!(
        gate.try_exclusive(&srv.id),
        Err(OrchestrationError::Busy(_))
    ));
}

#[tokio::test]
async fn create_during_reinstall_is_busy() {
    let transport = ScriptedTransport::new();
    let gate = InMemoryGate::new();
    let srv = server();
    let _reinstall = gate.try_exclusive(&srv.id).unwrap();

    let err = create_client(&transport, &gate, &srv, &[], "alice", None, Utc::now())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::Busy(_)));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn agent_rejection_is_an_agent_error_without_status_change() {
    let transport = ScriptedTransport::new().then(
        AgentResult::failed("Create failed", "client exists")
            .with_code(AgentErrorCode::AlreadyExists),
    );
    let gate = InMemoryGate::new();

    let err = create_client(&transport, &gate, &server(), &[], "alice", None, Utc::now())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::Agent { .. }));
    assert_eq!(err.status_hint(), None);
}

proptest! {
    #[test]
    fn malformed_names_never_reach_the_agent(bad in "[a-z]{0,4}[ ./@!;$]{1,3}[a-z]{0,4}") {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let transport = ScriptedTransport::new();
        let gate = InMemoryGate::new();

        let outcome = rt.block_on(create_client(
            &transport, &gate, &server(), &[], &bad, None, Utc::now(),
        ));

        prop_assert!(matches!(outcome, Err(OrchestrationError::Validation(_))));
        prop_assert!(transport.calls().is_empty());
    }
}

// ── List and download ─────────────────────────────────────────────────────────

#[tokio::test]
async fn list_decodes_the_ca_listing() {
    let transport = ScriptedTransport::new().then(listing(&["alice", "bob"]));
    let gate = InMemoryGate::new();

    let clients = list_clients(&transport, &gate, &server()).await.unwrap();

    let names: Vec<_> = clients.names().map(ToString::to_string).collect();
    assert_eq!(names, ["alice", "bob"]);
}

#[tokio::test]
async fn download_streams_the_bundle_into_the_sink() {
    let bundle = b"client\ndev tun\n<ca>\n...\n</ca>\n";
    let transport = ScriptedTransport::new().with_bundle(bundle);
    let gate = InMemoryGate::new();
    let mut sink = Vec::new();

    let bytes = download_config(&transport, &gate, &server(), &name("alice"), &mut sink)
        .await
        .unwrap();

    assert_eq!(bytes, bundle.len() as u64);
    assert_eq!(sink, bundle);
}

#[tokio::test]
async fn download_of_unknown_client_is_an_agent_error() {
    let transport = ScriptedTransport::new().then(
        AgentResult::failed("Bundle not found", "no bundle for ghost")
            .with_code(AgentErrorCode::NotFound),
    );
    let gate = InMemoryGate::new();
    let mut sink = Vec::new();

    let err = download_config(&transport, &gate, &server(), &name("ghost"), &mut sink)
        .await
        .unwrap_err();

    match err {
        OrchestrationError::Agent { command, .. } => assert_eq!(command, CommandName::FetchBundle),
        other => panic!("expected agent error, got {other:?}"),
    }
    assert!(sink.is_empty());
}

// ── Revoke ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn revoke_active_client() {
    let transport = ScriptedTransport::new().then(AgentResult::ok("Revoked"));
    let gate = InMemoryGate::new();

    let revocation = revoke_client(&transport, &gate, &server(), &record("alice"))
        .await
        .unwrap();

    assert!(!revocation.already_revoked);
    assert_eq!(transport.call_names(), vec![CommandName::RevokeClient]);
}

#[tokio::test]
async fn revoking_a_revoked_record_sends_nothing() {
    let transport = ScriptedTransport::new();
    let gate = InMemoryGate::new();

    let revocation = revoke_client(&transport, &gate, &server(), &revoked_record("alice"))
        .await
        .unwrap();

    assert!(revocation.already_revoked);
    assert!(revocation.result.is_none());
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn agent_reporting_already_revoked_is_success() {
    let transport = ScriptedTransport::new().then(
        AgentResult::failed("Revoke failed", "certificate already revoked")
            .with_code(AgentErrorCode::AlreadyRevoked),
    );
    let gate = InMemoryGate::new();

    let revocation = revoke_client(&transport, &gate, &server(), &record("alice"))
        .await
        .unwrap();

    assert!(revocation.already_revoked);
}

// ── Sync ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sync_reports_orphaned_and_unrecorded_clients() {
    let transport = ScriptedTransport::new().then(listing(&["alice", "bob"]));
    let gate = InMemoryGate::new();

    let report = sync_clients(
        &transport,
        &gate,
        &server(),
        &[record("alice"), record("carol")],
    )
    .await
    .unwrap();

    assert_eq!(report.clients_on_server, 2);
    assert_eq!(report.clients_in_db, 2);
    assert_eq!(report.orphaned_clients, vec![name("carol")]);
    assert_eq!(report.new_clients, vec![name("bob")]);
    assert_eq!(report.clients_removed, 1);
}

#[tokio::test]
async fn sync_with_matching_sets_changes_nothing() {
    let transport = ScriptedTransport::new().then(listing(&["alice"]));
    let gate = InMemoryGate::new();

    let report = sync_clients(&transport, &gate, &server(), &[record("alice")])
        .await
        .unwrap();

    assert!(report.orphaned_clients.is_empty());
    assert!(report.new_clients.is_empty());
}

#[tokio::test]
async fn sync_surfaces_certificates_with_foreign_names() {
    let transport = ScriptedTransport::new()
        .then(listing_with_foreign(&["alice"], &["eve@corp", "mallory.backdoor"]));
    let gate = InMemoryGate::new();

    let report = sync_clients(&transport, &gate, &server(), &[record("alice")])
        .await
        .unwrap();

    assert!(report.new_clients.is_empty());
    assert_eq!(report.unrecognized_clients, ["eve@corp", "mallory.backdoor"]);
    assert_eq!(report.clients_on_server, 3);
    assert_eq!(report.clients_removed, 0);
    assert!(report.has_unexplained());
}
