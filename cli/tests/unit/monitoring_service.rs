//! Status, traffic, and session use-cases.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use fleetvpn_cli::application::gate::InMemoryGate;
use fleetvpn_cli::application::ports::OperationGate;
use fleetvpn_cli::application::services::monitoring::{
    SWEEP_CONCURRENCY, check_status, disconnect_client, get_stats, sweep_fleet,
};
use fleetvpn_cli::application::services::tunnel::{TunnelAction, tunnel};
use fleetvpn_cli::domain::{OrchestrationError, Server, ServerId, ServerStatus, TransportError};
use fleetvpn_common::{
    AgentCommand, AgentResult, CommandName, Connection, ServiceState, ServiceStatus, TrafficStats,
};
use serde_json::json;

use crate::helpers::{name, ok_with, server, service};
use crate::mocks::ScriptedTransport;

fn session(cn: &str, rx: u64, tx: u64) -> Connection {
    Connection {
        common_name: cn.to_string(),
        real_address: "198.51.100.4:51820".to_string(),
        virtual_address: "10.8.0.6".to_string(),
        bytes_received: rx,
        bytes_sent: tx,
        connected_since: "2026-10-19 08:00:00".to_string(),
    }
}

#[tokio::test]
async fn status_maps_service_state_onto_server_status() {
    for (state, expected) in [
        (ServiceState::Running, Some(ServerStatus::Running)),
        (ServiceState::Stopped, Some(ServerStatus::Stopped)),
        (ServiceState::Error, Some(ServerStatus::Error)),
        (ServiceState::Other("activating".into()), None),
    ] {
        let transport = ScriptedTransport::new().then(service(state.clone()));

        let report = check_status(&transport, &server()).await.unwrap();

        assert_eq!(report.status, expected, "for {state:?}");
    }
}

#[tokio::test]
async fn status_runs_alongside_a_lifecycle_operation() {
    let gate = InMemoryGate::new();
    let srv = server();
    let _reinstall = gate.try_exclusive(&srv.id).unwrap();
    let transport = ScriptedTransport::new().then(service(ServiceState::Running));

    let report = check_status(&transport, &srv).await.unwrap();

    assert!(report.service.service_running);
}

#[tokio::test]
async fn status_timeout_hints_unknown() {
    let transport = ScriptedTransport::new().then_fail(TransportError::Timeout {
        host: "203.0.113.7".into(),
        command: CommandName::GetStatus,
        after: Duration::from_secs(30),
    });

    let err = check_status(&transport, &server()).await.unwrap_err();

    assert_eq!(err.status_hint(), Some(ServerStatus::Unknown));
}

// ── Fleet sweep ───────────────────────────────────────────────────────────────

fn fleet_server(id: &str, host: &str) -> Server {
    Server::new(ServerId::parse(id).unwrap(), host, 22, "root")
}

#[tokio::test]
async fn sweep_checks_every_server_and_keeps_going_past_failures() {
    let servers = [
        fleet_server("fra-1", "203.0.113.7"),
        fleet_server("ams-1", "203.0.113.8"),
        fleet_server("waw-1", "203.0.113.9"),
    ];
    let transport = ScriptedTransport::new()
        .then_for("203.0.113.7", Ok(service(ServiceState::Running)))
        .then_for(
            "203.0.113.8",
            Err(TransportError::Timeout {
                host: "203.0.113.8".into(),
                command: CommandName::GetStatus,
                after: Duration::from_secs(30),
            }),
        )
        .then_for("203.0.113.9", Ok(service(ServiceState::Stopped)));

    let checks = sweep_fleet(&transport, &servers).await;

    let ids: Vec<&str> = checks.iter().map(|c| c.server.as_str()).collect();
    assert_eq!(ids, ["fra-1", "ams-1", "waw-1"]);
    assert_eq!(
        checks[0].outcome.as_ref().unwrap().status,
        Some(ServerStatus::Running)
    );
    let err = checks[1].outcome.as_ref().unwrap_err();
    assert_eq!(err.status_hint(), Some(ServerStatus::Unknown));
    assert_eq!(
        checks[2].outcome.as_ref().unwrap().status,
        Some(ServerStatus::Stopped)
    );
    assert_eq!(transport.call_names(), vec![CommandName::GetStatus; 3]);
}

#[tokio::test]
async fn sweep_larger_than_the_concurrency_limit_checks_everyone() {
    let servers: Vec<Server> = (0..SWEEP_CONCURRENCY + 3)
        .map(|i| fleet_server(&format!("node-{i}"), &format!("198.51.100.{}", i + 1)))
        .collect();
    let transport = servers.iter().fold(ScriptedTransport::new(), |t, s| {
        t.then_for(&s.host, Ok(service(ServiceState::Running)))
    });

    let checks = sweep_fleet(&transport, &servers).await;

    assert_eq!(checks.len(), servers.len());
    assert!(checks.iter().all(|c| c.outcome.is_ok()));
}

#[tokio::test]
async fn sweep_of_an_empty_fleet_contacts_nobody() {
    let transport = ScriptedTransport::new();

    let checks = sweep_fleet(&transport, &[]).await;

    assert!(checks.is_empty());
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn stats_carry_sessions_and_totals() {
    let connections = vec![session("alice", 100, 200), session("bob", 1, 2)];
    let transport = ScriptedTransport::new().then(ok_with(
        "Service status",
        &ServiceStatus {
            status: ServiceState::Running,
            service_running: true,
            stats: TrafficStats::from_connections(&connections),
            connections,
        },
    ));

    let stats = get_stats(&transport, &server()).await.unwrap();

    assert_eq!(stats.connections.len(), 2);
    assert_eq!(stats.stats.connected_clients, 2);
    assert_eq!(stats.stats.bytes_received, 101);
    assert_eq!(stats.stats.bytes_sent, 202);
}

#[tokio::test]
async fn disconnect_reports_whether_a_session_ended() {
    let transport = ScriptedTransport::new()
        .then(ok_with("Disconnected", &json!({ "disconnected": true })))
        .then(AgentResult::ok("Client not connected"));

    let first = disconnect_client(&transport, &server(), &name("alice"))
        .await
        .unwrap();
    let second = disconnect_client(&transport, &server(), &name("alice"))
        .await
        .unwrap();

    assert!(first.disconnected);
    assert!(!second.disconnected);
    assert!(matches!(
        transport.calls().as_slice(),
        [AgentCommand::DisconnectClient(_), AgentCommand::DisconnectClient(_)]
    ));
}

// ── stunnel ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stunnel_setup_wraps_the_configured_vpn_port() {
    let transport = ScriptedTransport::new().then(AgentResult::ok("stunnel configured"));
    let gate = InMemoryGate::new();
    let srv = server();

    let outcome = tunnel(&transport, &gate, &srv, TunnelAction::Setup { stunnel_port: 443 })
        .await
        .unwrap();

    assert_eq!(outcome.stunnel_enabled, Some(true));
    match transport.calls().as_slice() {
        [AgentCommand::StunnelSetup(params)] => {
            assert_eq!(params.stunnel_port, 443);
            assert_eq!(params.openvpn_port, srv.vpn_port);
            assert_eq!(params.server_ip, srv.host);
        }
        other => panic!("expected stunnel-setup, got {other:?}"),
    }
}

#[tokio::test]
async fn stunnel_setup_rejects_port_zero() {
    let transport = ScriptedTransport::new();
    let gate = InMemoryGate::new();

    let err = tunnel(&transport, &gate, &server(), TunnelAction::Setup { stunnel_port: 0 })
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::Validation(_)));
    assert!(transport.calls().is_empty());
}
