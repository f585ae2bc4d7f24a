//! Application services — use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports` — never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

pub mod certificates;
pub mod credentials;
pub mod deploy;
pub mod lifecycle;
pub mod monitoring;
pub mod sync;
pub mod tunnel;

use fleetvpn_common::{AgentCommand, AgentResult, CommandName};
use serde::de::DeserializeOwned;

use crate::application::ports::AgentTransport;
use crate::domain::{OrchestrationError, Server, TransportError};

/// Validate `command`, send it with its own time ceiling, and return the
/// agent's normalized result whether or not it reports success.
///
/// Nothing is sent when validation fails.
///
/// # Errors
///
/// Returns [`OrchestrationError::Validation`] for bad parameters, and
/// [`OrchestrationError::Timeout`] or [`OrchestrationError::Transport`] when
/// the exchange itself fails.
pub async fn dispatch(
    transport: &impl AgentTransport,
    server: &Server,
    command: &AgentCommand,
) -> Result<AgentResult, OrchestrationError> {
    command.validate()?;
    let name = command.name();
    tracing::debug!(server = %server.id, command = %name, "dispatching agent command");
    let result = transport
        .invoke(server, command, command.max_duration())
        .await
        .map_err(|e| transport_failure(server, name, e))?
        .normalized();
    tracing::debug!(server = %server.id, command = %name, success = result.success, "agent replied");
    Ok(result)
}

/// Like [`dispatch`], but an agent-reported failure is an error.
///
/// # Errors
///
/// As [`dispatch`], plus [`OrchestrationError::Agent`] when `success=false`.
pub async fn dispatch_ok(
    transport: &impl AgentTransport,
    server: &Server,
    command: &AgentCommand,
) -> Result<AgentResult, OrchestrationError> {
    let result = dispatch(transport, server, command).await?;
    require_success(server, command.name(), result)
}

pub(crate) fn require_success(
    server: &Server,
    command: CommandName,
    result: AgentResult,
) -> Result<AgentResult, OrchestrationError> {
    if result.success {
        Ok(result)
    } else {
        Err(OrchestrationError::Agent {
            server: server.id.clone(),
            command,
            result: Box::new(result),
        })
    }
}

pub(crate) fn transport_failure(
    server: &Server,
    command: CommandName,
    err: TransportError,
) -> OrchestrationError {
    match err {
        TransportError::Timeout { .. } => OrchestrationError::Timeout {
            server: server.id.clone(),
            command,
        },
        source => OrchestrationError::Transport {
            server: server.id.clone(),
            command,
            source,
        },
    }
}

/// Decode the typed payload of a successful result. A payload that does not
/// match is a protocol fault on the agent's side.
pub(crate) fn payload<T: DeserializeOwned>(
    server: &Server,
    command: CommandName,
    result: &AgentResult,
) -> Result<T, OrchestrationError> {
    result.payload().map_err(|e| OrchestrationError::Transport {
        server: server.id.clone(),
        command,
        source: TransportError::Protocol {
            host: server.host.clone(),
            reason: e.to_string(),
        },
    })
}
