//! Application service — status, traffic, and session use-cases.
//!
//! These are read-mostly and take no gate: they may run alongside any other
//! operation on the same server.

use fleetvpn_common::{
    AgentCommand, AgentResult, ClientName, ClientParams, CommandName, Connection, ServiceStatus,
    TrafficStats,
};
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;

use crate::application::ports::AgentTransport;
use crate::application::services::{dispatch_ok, payload};
use crate::domain::{OrchestrationError, Server, ServerId, ServerStatus};

/// Servers a fleet sweep talks to at once.
pub const SWEEP_CONCURRENCY: usize = 8;

/// The service state the agent observed.
#[derive(Debug)]
pub struct StatusReport {
    pub service: ServiceStatus,
    /// Status to record, or `None` when the agent's state has no
    /// counterpart.
    pub status: Option<ServerStatus>,
    pub result: AgentResult,
}

/// Ask the agent for the VPN unit's state.
///
/// # Errors
///
/// Returns any dispatch error. On timeout the caller should record
/// [`ServerStatus::Unknown`], per [`OrchestrationError::status_hint`].
pub async fn check_status(
    transport: &impl AgentTransport,
    server: &Server,
) -> Result<StatusReport, OrchestrationError> {
    let result = dispatch_ok(transport, server, &AgentCommand::GetStatus).await?;
    let service: ServiceStatus = payload(server, CommandName::GetStatus, &result)?;
    Ok(StatusReport {
        status: ServerStatus::from_service(&service.status),
        service,
        result,
    })
}

/// One server's answer in a fleet sweep.
#[derive(Debug)]
pub struct ServerCheck {
    pub server: ServerId,
    pub outcome: Result<StatusReport, OrchestrationError>,
}

/// Check every server in `servers`, up to [`SWEEP_CONCURRENCY`] at a time.
///
/// A failing server does not stop the sweep; its error is returned in its
/// [`ServerCheck`]. Results come back in the order of `servers`.
pub async fn sweep_fleet(transport: &impl AgentTransport, servers: &[Server]) -> Vec<ServerCheck> {
    let checks: Vec<ServerCheck> = stream::iter(servers)
        .map(|server| async move {
            let outcome = check_status(transport, server).await;
            if let Err(err) = &outcome {
                tracing::warn!(server = %server.id, error = %err, "status check failed");
            }
            ServerCheck {
                server: server.id.clone(),
                outcome,
            }
        })
        .buffered(SWEEP_CONCURRENCY)
        .collect()
        .await;
    tracing::info!(
        servers = checks.len(),
        failed = checks.iter().filter(|c| c.outcome.is_err()).count(),
        "fleet sweep finished"
    );
    checks
}

/// Traffic totals plus the sessions they were summed from.
#[derive(Debug)]
pub struct ServerStats {
    pub stats: TrafficStats,
    pub connections: Vec<Connection>,
}

/// Current sessions and byte counters.
///
/// # Errors
///
/// Returns any dispatch error.
pub async fn get_stats(
    transport: &impl AgentTransport,
    server: &Server,
) -> Result<ServerStats, OrchestrationError> {
    let report = check_status(transport, server).await?;
    Ok(ServerStats {
        stats: report.service.stats,
        connections: report.service.connections,
    })
}

#[derive(Debug, Deserialize)]
struct DisconnectPayload {
    #[serde(default)]
    disconnected: bool,
}

/// Outcome of ending a client's session.
#[derive(Debug)]
pub struct Disconnect {
    /// False when the client had no live session.
    pub disconnected: bool,
    pub result: AgentResult,
}

/// End a client's live session. A client that is not connected is not an
/// error.
///
/// # Errors
///
/// Returns any dispatch error.
pub async fn disconnect_client(
    transport: &impl AgentTransport,
    server: &Server,
    name: &ClientName,
) -> Result<Disconnect, OrchestrationError> {
    let command = AgentCommand::DisconnectClient(ClientParams { name: name.clone() });
    let result = dispatch_ok(transport, server, &command).await?;
    let disconnected = payload::<DisconnectPayload>(server, CommandName::DisconnectClient, &result)
        .map(|p| p.disconnected)
        .unwrap_or(false);
    Ok(Disconnect {
        disconnected,
        result,
    })
}
