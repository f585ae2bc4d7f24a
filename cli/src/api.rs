//! Response shapes for `--json` output.
//!
//! Field names follow the agent protocol so scripts can treat a controller
//! response and a raw agent result alike.

use fleetvpn_common::{AgentResult, CertificateStatus, Connection, KeyType, ServiceStatus};
use serde::Serialize;

use crate::domain::{ClientRecord, ReconciliationReport, Server, ServerStatus};

/// install, configure, start/stop/restart, stunnel, revoke, deploy.
#[derive(Debug, Serialize)]
pub struct OperationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ServerStatus>,
}

impl OperationResponse {
    #[must_use]
    pub fn from_result(result: &AgentResult, status: Option<ServerStatus>) -> Self {
        Self {
            success: result.success,
            message: result.message.clone(),
            output: Some(result.output.clone()).filter(|o| !o.is_empty()),
            status,
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            output: None,
            status: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    pub success: bool,
    pub steps: Vec<OperationStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ServerStatus>,
}

#[derive(Debug, Serialize)]
pub struct OperationStep {
    pub command: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ReinstallResponse {
    pub success: bool,
    pub message: String,
    pub steps: Vec<String>,
    pub service_running: bool,
    pub status: ServerStatus,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    /// The agent's literal, passed through unchanged.
    pub status: String,
    pub service_running: bool,
    pub recorded_status: ServerStatus,
    pub connected_clients: usize,
}

impl StatusResponse {
    #[must_use]
    pub fn new(service: &ServiceStatus, recorded_status: ServerStatus) -> Self {
        Self {
            success: true,
            status: service.status.as_str().to_string(),
            service_running: service.service_running,
            recorded_status,
            connected_clients: service.stats.connected_clients,
        }
    }
}

/// One sweep of `fleetvpn monitor`.
#[derive(Debug, Serialize)]
pub struct MonitorResponse {
    /// False when any server could not be checked.
    pub success: bool,
    pub checked_at: chrono::DateTime<chrono::Utc>,
    pub servers: Vec<MonitorEntry>,
}

#[derive(Debug, Serialize)]
pub struct MonitorEntry {
    pub id: String,
    pub recorded_status: ServerStatus,
    /// The agent's literal; absent when the check failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub connected_clients: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub connected_clients: usize,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
    pub message: String,
    pub disconnected: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateClientResponse {
    pub success: bool,
    pub client_id: String,
    pub bundle_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub success: bool,
    pub client_id: String,
    pub path: String,
    pub bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub success: bool,
    pub message: String,
    pub already_revoked: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: ReconciliationReport,
}

#[derive(Debug, Serialize)]
pub struct SshKeyResponse {
    pub success: bool,
    pub public_key: String,
    pub key_type: KeyType,
    pub private_key_path: String,
    pub password_cleared: bool,
}

#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub success: bool,
    pub message: String,
    pub sha256: String,
}

/// One row of `server list`.
#[derive(Debug, Serialize)]
pub struct ServerSummary {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub status: ServerStatus,
    pub auth: &'static str,
    /// False once the server was switched to key-only authentication.
    pub password_login: bool,
    pub stunnel_enabled: bool,
    pub active_clients: usize,
}

impl ServerSummary {
    #[must_use]
    pub fn new(server: &Server, clients: &[ClientRecord]) -> Self {
        Self {
            id: server.id.to_string(),
            host: server.host.clone(),
            port: server.port,
            username: server.username.clone(),
            status: server.status,
            auth: if server.private_key().is_some() {
                "key"
            } else {
                "password"
            },
            password_login: server.password_login,
            stunnel_enabled: server.stunnel_enabled,
            active_clients: clients.iter().filter(|c| c.is_active()).count(),
        }
    }
}

/// One row of `client list`, from the local record.
#[derive(Debug, Serialize)]
pub struct ClientSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub status: CertificateStatus,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<String>,
}

impl From<&ClientRecord> for ClientSummary {
    fn from(record: &ClientRecord) -> Self {
        Self {
            name: record.name.to_string(),
            email: record.email.clone(),
            status: record.status,
            created_at: record.created_at.to_rfc3339(),
            revoked_at: record.revoked_at.map(|t| t.to_rfc3339()),
        }
    }
}
