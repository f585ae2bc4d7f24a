//! Error types shared across the protocol boundary.

use std::time::Duration;

use thiserror::Error;

/// Malformed input rejected before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid client name '{0}': must match [A-Za-z0-9_-]+")]
    InvalidClientName(String),

    #[error("Invalid email address '{0}'")]
    InvalidEmail(String),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Unsupported key type '{0}': expected ed25519 or rsa")]
    UnsupportedKeyType(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid host '{0}'")]
    InvalidHost(String),

    #[error("Invalid port {0}")]
    InvalidPort(u16),

    #[error("Client '{0}' already exists on this server")]
    DuplicateClient(String),

    #[error("Invalid server id '{0}': must match [A-Za-z0-9_-]+")]
    InvalidServerId(String),
}

/// A request or response that does not fit the command protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("invalid parameters for '{command}': {reason}")]
    InvalidParams { command: String, reason: String },

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failure to run a local process to completion.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", after.as_secs())]
    TimedOut { program: String, after: Duration },
}

impl ProcessError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}
