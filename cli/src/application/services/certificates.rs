//! Application service — client certificate use-cases.
//!
//! Certificate operations share their server with each other but never run
//! alongside a lifecycle operation.

use chrono::{DateTime, Utc};
use fleetvpn_common::{
    AgentCommand, AgentErrorCode, AgentResult, ClientListing, ClientName, ClientParams,
    CommandName, CreateClientParams, CreatedClient,
};
use tokio::io::AsyncWrite;

use crate::application::ports::{AgentTransport, BundleFetch, OperationGate};
use crate::application::services::{
    dispatch, dispatch_ok, payload, require_success, transport_failure,
};
use crate::domain::{ClientRecord, OrchestrationError, Server, validate_new_client};

/// A client the agent has issued.
#[derive(Debug)]
pub struct IssuedClient {
    /// Record to append to the server's client list.
    pub record: ClientRecord,
    /// Where the agent wrote the `.ovpn` bundle.
    pub bundle_path: String,
    pub result: AgentResult,
}

/// Issue a certificate and bundle for a new client.
///
/// The name and email are checked against the local records before anything
/// is sent.
///
/// # Errors
///
/// Returns [`OrchestrationError::Validation`] for a malformed or duplicate
/// name, [`OrchestrationError::Busy`] during a lifecycle operation, or any
/// dispatch error.
pub async fn create_client(
    transport: &impl AgentTransport,
    gate: &impl OperationGate,
    server: &Server,
    existing: &[ClientRecord],
    name: &str,
    email: Option<&str>,
    now: DateTime<Utc>,
) -> Result<IssuedClient, OrchestrationError> {
    let new = validate_new_client(name, email, existing)?;
    let _permit = gate.try_shared(&server.id)?;

    let command = AgentCommand::CreateClient(CreateClientParams {
        name: new.name.clone(),
        email: new.email.clone(),
        server_host: server.host.clone(),
        port: server.vpn_port,
        protocol: server.vpn_protocol,
    });
    let result = dispatch_ok(transport, server, &command).await?;
    let created: CreatedClient = payload(server, CommandName::CreateClient, &result)?;
    if created.client_id != new.name {
        tracing::warn!(
            requested = %new.name,
            issued = %created.client_id,
            "agent issued a different client name"
        );
    }
    Ok(IssuedClient {
        record: ClientRecord::new(new.name, new.email, now),
        bundle_path: created.bundle_path,
        result,
    })
}

/// Certificates the server's CA knows about.
///
/// # Errors
///
/// Returns [`OrchestrationError::Busy`] during a lifecycle operation, or any
/// dispatch error.
pub async fn list_clients(
    transport: &impl AgentTransport,
    gate: &impl OperationGate,
    server: &Server,
) -> Result<ClientListing, OrchestrationError> {
    let _permit = gate.try_shared(&server.id)?;
    let result = dispatch_ok(transport, server, &AgentCommand::ListClients).await?;
    payload(server, CommandName::ListClients, &result)
}

/// Stream a client's `.ovpn` bundle into `sink`, returning the byte count.
///
/// # Errors
///
/// Returns [`OrchestrationError::Agent`] if the server has no bundle for
/// `name`, or a transport error.
pub async fn download_config(
    transport: &impl AgentTransport,
    gate: &impl OperationGate,
    server: &Server,
    name: &ClientName,
    sink: &mut (dyn AsyncWrite + Unpin + Send),
) -> Result<u64, OrchestrationError> {
    let _permit = gate.try_shared(&server.id)?;
    let command = CommandName::FetchBundle;
    match transport
        .fetch_bundle(server, name, sink, command.max_duration())
        .await
        .map_err(|e| transport_failure(server, command, e))?
    {
        BundleFetch::Streamed(bytes) => Ok(bytes),
        BundleFetch::Rejected(result) => {
            require_success(server, command, result.normalized()).map(|_| 0)
        }
    }
}

/// What a revocation did.
#[derive(Debug)]
pub struct Revocation {
    /// The certificate was already revoked; nothing changed.
    pub already_revoked: bool,
    /// The agent's result, when the agent was asked.
    pub result: Option<AgentResult>,
}

/// Revoke a client's certificate. Revoking an already-revoked client is a
/// successful no-op; a record already marked revoked is not sent at all.
///
/// # Errors
///
/// Returns [`OrchestrationError::Busy`] during a lifecycle operation, or any
/// dispatch error other than the agent reporting the client already revoked.
pub async fn revoke_client(
    transport: &impl AgentTransport,
    gate: &impl OperationGate,
    server: &Server,
    record: &ClientRecord,
) -> Result<Revocation, OrchestrationError> {
    if !record.is_active() {
        return Ok(Revocation {
            already_revoked: true,
            result: None,
        });
    }
    let _permit = gate.try_shared(&server.id)?;
    let command = AgentCommand::RevokeClient(ClientParams {
        name: record.name.clone(),
    });
    let result = dispatch(transport, server, &command).await?;
    if !result.success && result.is_code(AgentErrorCode::AlreadyRevoked) {
        return Ok(Revocation {
            already_revoked: true,
            result: Some(result),
        });
    }
    let result = require_success(server, CommandName::RevokeClient, result)?;
    Ok(Revocation {
        already_revoked: false,
        result: Some(result),
    })
}
