//! Application service — put the agent binary on a server.

use std::path::Path;

use fleetvpn_common::CommandName;

use crate::application::ports::{AgentInstaller, OperationGate};
use crate::application::services::transport_failure;
use crate::domain::{OrchestrationError, Server};

/// Upload the agent at `local` and check the host's digest of the installed
/// copy against `local_sha256`.
///
/// # Errors
///
/// Returns [`OrchestrationError::Busy`] if another operation holds the
/// server, a transport error, or [`OrchestrationError::Integrity`] when the
/// digests differ.
pub async fn deploy_agent(
    installer: &impl AgentInstaller,
    gate: &impl OperationGate,
    server: &Server,
    local: &Path,
    local_sha256: &str,
) -> Result<String, OrchestrationError> {
    let _permit = gate.try_exclusive(&server.id)?;
    let remote = installer
        .install_agent(server, local)
        .await
        .map_err(|e| transport_failure(server, CommandName::Install, e))?;
    if !remote.eq_ignore_ascii_case(local_sha256) {
        return Err(OrchestrationError::Integrity {
            server: server.id.clone(),
            expected: local_sha256.to_string(),
            actual: remote,
        });
    }
    tracing::info!(server = %server.id, sha256 = %remote, "agent deployed");
    Ok(remote)
}
