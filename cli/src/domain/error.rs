//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::time::Duration;

use fleetvpn_common::{AgentResult, ClientName, CommandName, ValidationError};
use thiserror::Error;

use crate::domain::server::{ServerId, ServerStatus};

// ── Transport errors ──────────────────────────────────────────────────────────

/// Failure of the channel to a remote agent, as distinct from an agent that
/// ran and reported `success=false`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("authentication to {host} failed")]
    Authentication { host: String },

    #[error("cannot connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("connection to {host} failed after the command was sent: {reason}")]
    Channel { host: String, reason: String },

    #[error("'{command}' on {host} did not finish within {}s", after.as_secs())]
    Timeout {
        host: String,
        command: CommandName,
        after: Duration,
    },

    #[error("unreadable response from agent on {host}: {reason}")]
    Protocol { host: String, reason: String },

    #[error("no usable credential for {host}: {reason}")]
    Credential { host: String, reason: String },
}

impl TransportError {
    /// Whether the failure happened while establishing the session, before
    /// anything reached the agent. Only these are safe to retry.
    #[must_use]
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }

    /// Whether the command may have run on the host.
    #[must_use]
    pub fn after_dispatch(&self) -> bool {
        matches!(
            self,
            Self::Channel { .. } | Self::Timeout { .. } | Self::Protocol { .. }
        )
    }
}

// ── Orchestration errors ──────────────────────────────────────────────────────

/// Everything an orchestration service can report besides success.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{command} on {server}: {source}")]
    Transport {
        server: ServerId,
        command: CommandName,
        #[source]
        source: TransportError,
    },

    #[error("{command} on {server} timed out; check the server status before assuming an outcome")]
    Timeout { server: ServerId, command: CommandName },

    #[error("{command} failed on {server}: {}", result.error_text())]
    Agent {
        server: ServerId,
        command: CommandName,
        result: Box<AgentResult>,
    },

    #[error("reinstall of {server} failed after {} completed step(s): {}", completed.len(), result.error_text())]
    PartialFailure {
        server: ServerId,
        completed: Vec<String>,
        result: Box<AgentResult>,
    },

    #[error("provisioning {server} stopped at '{step}': {source}")]
    StepFailed {
        server: ServerId,
        step: CommandName,
        completed: Vec<CommandName>,
        #[source]
        source: Box<OrchestrationError>,
    },

    #[error("server {0} is busy with another operation")]
    Busy(ServerId),

    #[error("reinstall of {0} requires explicit confirmation")]
    NotConfirmed(ServerId),

    #[error("client '{0}' not found on {1}")]
    UnknownClient(ClientName, ServerId),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("agent on {server} has SHA-256 {actual}, expected {expected}")]
    Integrity {
        server: ServerId,
        expected: String,
        actual: String,
    },
}

impl OrchestrationError {
    /// The status the caller should record for the server after this
    /// failure, or `None` to leave it untouched.
    ///
    /// A timeout, or a channel that broke after dispatch, leaves the outcome
    /// unknown. A lifecycle command the agent reported as failed leaves the
    /// server in `error`. Failures before dispatch change nothing.
    #[must_use]
    pub fn status_hint(&self) -> Option<ServerStatus> {
        match self {
            Self::Timeout { .. } => Some(ServerStatus::Unknown),
            Self::Transport { source, .. } if source.after_dispatch() => Some(ServerStatus::Unknown),
            Self::Agent { command, .. } if command.is_lifecycle() => Some(ServerStatus::Error),
            Self::PartialFailure { .. } => Some(ServerStatus::Error),
            Self::StepFailed { source, .. } => source.status_hint(),
            _ => None,
        }
    }

    /// Machine-readable kind for JSON error output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Agent { .. } => "agent",
            Self::PartialFailure { .. } => "partial-failure",
            Self::StepFailed { .. } => "step-failed",
            Self::Busy(_) => "busy",
            Self::NotConfirmed(_) => "not-confirmed",
            Self::UnknownClient(..) => "not-found",
            Self::KeyGeneration(_) => "key-generation",
            Self::Integrity { .. } => "integrity",
        }
    }

    /// The agent's result, when the agent ran and reported failure.
    #[must_use]
    pub fn agent_result(&self) -> Option<&AgentResult> {
        match self {
            Self::Agent { result, .. } | Self::PartialFailure { result, .. } => Some(result),
            Self::StepFailed { source, .. } => source.agent_result(),
            _ => None,
        }
    }
}

// ── Inventory errors ──────────────────────────────────────────────────────────

/// Errors about the local record of servers and clients.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Server '{0}' not found. Add it with: fleetvpn server add {0} <host>")]
    ServerNotFound(String),

    #[error("Server '{0}' already exists. Remove it first: fleetvpn server remove {0}")]
    ServerExists(String),

    #[error("Client '{client}' not found on server '{server}'")]
    ClientNotFound { server: String, client: String },
}
