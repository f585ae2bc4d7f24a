//! Shared fixtures: servers, records, and agent results with payloads.

#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use chrono::Utc;
use fleetvpn_cli::domain::{ClientRecord, Server, ServerId, ServerStatus};
use fleetvpn_common::{
    AgentResult, ClientEntry, ClientListing, ClientName, CertificateStatus, CreatedClient,
    ServiceState, ServiceStatus, TrafficStats,
};
use serde::Serialize;

pub fn server() -> Server {
    Server::new(ServerId::parse("fra-1").unwrap(), "203.0.113.7", 22, "root")
}

pub fn server_with_status(status: ServerStatus) -> Server {
    Server {
        status,
        ..server()
    }
}

pub fn name(s: &str) -> ClientName {
    ClientName::parse(s).unwrap()
}

pub fn record(s: &str) -> ClientRecord {
    ClientRecord::new(name(s), None, Utc::now())
}

pub fn revoked_record(s: &str) -> ClientRecord {
    let mut r = record(s);
    r.revoke(Utc::now());
    r
}

pub fn ok_with<T: Serialize>(message: &str, payload: &T) -> AgentResult {
    AgentResult::ok(message).with_payload(payload).unwrap()
}

pub fn created(client: &str) -> AgentResult {
    ok_with(
        "Client created",
        &CreatedClient {
            client_id: name(client),
            bundle_path: format!("/etc/openvpn/clients/{client}.ovpn"),
        },
    )
}

pub fn listing(names: &[&str]) -> AgentResult {
    listing_with_foreign(names, &[])
}

/// A listing that also carries certificates under non-client common names.
pub fn listing_with_foreign(names: &[&str], foreign: &[&str]) -> AgentResult {
    ok_with(
        "Clients listed",
        &ClientListing {
            unrecognized: foreign.iter().map(ToString::to_string).collect(),
            clients: names
                .iter()
                .map(|n| ClientEntry {
                    name: name(n),
                    status: CertificateStatus::Active,
                    expires_at: None,
                    revoked_at: None,
                })
                .collect(),
        },
    )
}

pub fn service(state: ServiceState) -> AgentResult {
    let running = state == ServiceState::Running;
    ok_with(
        "Service status",
        &ServiceStatus {
            status: state,
            service_running: running,
            connections: Vec::new(),
            stats: TrafficStats::default(),
        },
    )
}
