//! Application service — stunnel front end.

use fleetvpn_common::{AgentCommand, AgentResult, StunnelParams};

use crate::application::ports::{AgentTransport, OperationGate};
use crate::application::services::dispatch_ok;
use crate::domain::{OrchestrationError, Server};

/// What to do with the TLS tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelAction {
    /// Install and configure stunnel on `stunnel_port`.
    Setup { stunnel_port: u16 },
    Start,
    Stop,
    Restart,
}

#[derive(Debug)]
pub struct TunnelOutcome {
    pub result: AgentResult,
    /// New value for the server's `stunnel_enabled` flag, if it changes.
    pub stunnel_enabled: Option<bool>,
}

/// Set up or control stunnel. Setup wraps the server's configured VPN port
/// and names the certificate after its host.
///
/// # Errors
///
/// Returns [`OrchestrationError::Busy`] if another operation holds the
/// server, or any dispatch error.
pub async fn tunnel(
    transport: &impl AgentTransport,
    gate: &impl OperationGate,
    server: &Server,
    action: TunnelAction,
) -> Result<TunnelOutcome, OrchestrationError> {
    let _permit = gate.try_exclusive(&server.id)?;
    let (command, enabled) = match action {
        TunnelAction::Setup { stunnel_port } => (
            AgentCommand::StunnelSetup(StunnelParams {
                stunnel_port,
                openvpn_port: server.vpn_port,
                server_ip: server.host.clone(),
            }),
            Some(true),
        ),
        TunnelAction::Start => (AgentCommand::StunnelStart, None),
        TunnelAction::Stop => (AgentCommand::StunnelStop, None),
        TunnelAction::Restart => (AgentCommand::StunnelRestart, None),
    };
    let result = dispatch_ok(transport, server, &command).await?;
    Ok(TunnelOutcome {
        result,
        stunnel_enabled: enabled,
    })
}
