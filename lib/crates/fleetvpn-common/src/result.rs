//! The agent's response envelope.
//!
//! Every command answers with one [`AgentResult`]. Command-specific fields
//! (`client_id`, `status`, `clients`, ...) sit next to the common ones in the
//! same JSON object; [`AgentResult::with_payload`] writes them and
//! [`AgentResult::payload`] reads them back as a typed struct.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::types::{ClientEntry, ClientName, KeyType, ServiceState};

/// Machine-readable reason attached to a failed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentErrorCode {
    AlreadyRevoked,
    NotFound,
    AlreadyExists,
    CaExists,
    PkiMissing,
    InvalidParams,
    UnknownCommand,
    ServiceMissing,
    PortConflict,
    Unsupported,
    Internal,
    /// Sent by a newer agent; kept so the result still decodes.
    #[serde(other)]
    Unknown,
}

/// Result of one agent invocation.
///
/// Construct through [`AgentResult::ok`] or [`AgentResult::failed`] so a
/// failure always carries a non-empty `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<AgentErrorCode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentResult {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            output: String::new(),
            steps: None,
            error: None,
            error_code: None,
            extra: Map::new(),
        }
    }

    /// A failed result. An empty `error` is replaced by `message` (or a
    /// generic text) so the failure is never silent.
    #[must_use]
    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        let message = message.into();
        let mut error = error.into();
        if error.trim().is_empty() {
            error = if message.trim().is_empty() {
                "command failed".to_string()
            } else {
                message.clone()
            };
        }
        Self {
            success: false,
            message,
            output: String::new(),
            steps: None,
            error: Some(error),
            error_code: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: AgentErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Merge the fields of `payload` into the result object.
    ///
    /// # Errors
    ///
    /// Returns an error if `payload` does not serialize to a JSON object.
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self, ProtocolError> {
        match serde_json::to_value(payload)? {
            Value::Object(fields) => {
                self.extra.extend(fields);
                Ok(self)
            }
            other => Err(ProtocolError::InvalidParams {
                command: "payload".to_string(),
                reason: format!("expected an object, got {other}"),
            }),
        }
    }

    /// Read the command-specific fields back as `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the fields do not match `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(serde_json::from_value(Value::Object(self.extra.clone()))?)
    }

    /// The error text, or the message when none was sent.
    #[must_use]
    pub fn error_text(&self) -> &str {
        self.error
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(&self.message)
    }

    /// Re-establish the failure invariant on a decoded result.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if !self.success && self.error.as_deref().is_none_or(|e| e.trim().is_empty()) {
            self.error = Some(if self.message.trim().is_empty() {
                "agent reported failure without detail".to_string()
            } else {
                self.message.clone()
            });
        }
        self
    }

    #[must_use]
    pub fn is_code(&self, code: AgentErrorCode) -> bool {
        self.error_code == Some(code)
    }
}

// ── Typed payloads ────────────────────────────────────────────────────────────

/// `list-clients`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientListing {
    pub clients: Vec<ClientEntry>,
    /// Common names in the CA index that are not valid client names. Such
    /// certificates were not issued by this tool.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unrecognized: Vec<String>,
}

impl ClientListing {
    /// Names of every certificate the CA knows, revoked ones included.
    pub fn names(&self) -> impl Iterator<Item = &ClientName> {
        self.clients.iter().map(|c| &c.name)
    }
}

/// `create-client`. The bundle path is a reference for later download; no
/// key material travels in this payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedClient {
    pub client_id: ClientName,
    pub bundle_path: String,
}

/// One live VPN session from the management interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub common_name: String,
    pub real_address: String,
    pub virtual_address: String,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub connected_since: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficStats {
    pub connected_clients: usize,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

impl TrafficStats {
    #[must_use]
    pub fn from_connections(connections: &[Connection]) -> Self {
        connections.iter().fold(
            Self {
                connected_clients: connections.len(),
                ..Self::default()
            },
            |acc, c| Self {
                bytes_received: acc.bytes_received.saturating_add(c.bytes_received),
                bytes_sent: acc.bytes_sent.saturating_add(c.bytes_sent),
                ..acc
            },
        )
    }
}

/// `get-status` and the service start/stop/restart commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: ServiceState,
    pub service_running: bool,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub stats: TrafficStats,
}

/// `reinstall`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinstallOutcome {
    pub service_running: bool,
}

/// `authorize-key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedKey {
    pub public_key: String,
    pub key_type: KeyType,
    pub already_present: bool,
}
