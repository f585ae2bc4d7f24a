//! Application service — VPN service lifecycle use-cases.
//!
//! Install, configure, provision, start/stop/restart, and reinstall. Every
//! operation here holds its server exclusively for its whole duration and
//! proposes the status the caller should record; it never writes the
//! inventory itself.

use fleetvpn_common::{
    AgentCommand, AgentResult, CommandName, ConfigureParams, ReinstallOutcome, ServiceStatus,
    VpnSettings,
};

use crate::application::ports::{AgentTransport, OperationGate, ProgressReporter};
use crate::application::services::{dispatch, dispatch_ok, payload};
use crate::domain::{OrchestrationError, Server, ServerStatus};

/// Result of a single lifecycle command.
#[derive(Debug)]
pub struct LifecycleOutcome {
    pub result: AgentResult,
    /// Status to record, or `None` to leave the record alone.
    pub status: Option<ServerStatus>,
}

/// Start, stop, or restart the VPN unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    fn command(self) -> AgentCommand {
        match self {
            Self::Start => AgentCommand::ServiceStart,
            Self::Stop => AgentCommand::ServiceStop,
            Self::Restart => AgentCommand::ServiceRestart,
        }
    }
}

/// Install the VPN packages.
///
/// # Errors
///
/// Returns [`OrchestrationError::Busy`] if another operation holds the
/// server, or any dispatch error.
pub async fn install(
    transport: &impl AgentTransport,
    gate: &impl OperationGate,
    server: &Server,
) -> Result<LifecycleOutcome, OrchestrationError> {
    let _permit = gate.try_exclusive(&server.id)?;
    let result = dispatch_ok(transport, server, &AgentCommand::Install).await?;
    Ok(LifecycleOutcome {
        result,
        status: Some(server.status.after_install()),
    })
}

/// Build the CA and render the server configuration. An existing CA is only
/// replaced when `force` is set.
///
/// # Errors
///
/// Returns [`OrchestrationError::Busy`] if another operation holds the
/// server, or any dispatch error.
pub async fn configure(
    transport: &impl AgentTransport,
    gate: &impl OperationGate,
    server: &Server,
    settings: VpnSettings,
    force: bool,
) -> Result<LifecycleOutcome, OrchestrationError> {
    let _permit = gate.try_exclusive(&server.id)?;
    let command = AgentCommand::Configure(ConfigureParams { settings, force });
    let result = dispatch_ok(transport, server, &command).await?;
    Ok(LifecycleOutcome {
        result,
        status: Some(ServerStatus::Configured),
    })
}

/// Start, stop, or restart the VPN unit. The proposed status comes from the
/// state the agent observed afterwards.
///
/// # Errors
///
/// Returns [`OrchestrationError::Busy`] if another operation holds the
/// server, or any dispatch error.
pub async fn control(
    transport: &impl AgentTransport,
    gate: &impl OperationGate,
    server: &Server,
    action: ServiceAction,
) -> Result<LifecycleOutcome, OrchestrationError> {
    let _permit = gate.try_exclusive(&server.id)?;
    let command = action.command();
    let result = dispatch_ok(transport, server, &command).await?;
    let status = payload::<ServiceStatus>(server, command.name(), &result)
        .ok()
        .and_then(|s| ServerStatus::from_service(&s.status));
    Ok(LifecycleOutcome { result, status })
}

/// Outcome of a full provisioning run.
#[derive(Debug)]
pub struct ProvisionOutcome {
    pub results: Vec<(CommandName, AgentResult)>,
    pub status: Option<ServerStatus>,
}

/// Install, configure, then start the service, stopping at the first
/// failure. The server is held for the whole sequence.
///
/// # Errors
///
/// Returns [`OrchestrationError::StepFailed`] naming the step that failed and
/// the steps that completed before it.
pub async fn provision(
    transport: &impl AgentTransport,
    gate: &impl OperationGate,
    server: &Server,
    settings: VpnSettings,
    reporter: &impl ProgressReporter,
) -> Result<ProvisionOutcome, OrchestrationError> {
    let _permit = gate.try_exclusive(&server.id)?;
    let steps = [
        AgentCommand::Install,
        AgentCommand::Configure(ConfigureParams {
            settings,
            force: false,
        }),
        AgentCommand::ServiceStart,
    ];

    let mut results = Vec::with_capacity(steps.len());
    let mut status = None;
    for command in &steps {
        let name = command.name();
        reporter.step(&format!("{name} on {}...", server.id));
        match dispatch_ok(transport, server, command).await {
            Ok(result) => {
                reporter.success(&result.message);
                status = match command {
                    AgentCommand::Install => Some(server.status.after_install()),
                    AgentCommand::Configure(_) => Some(ServerStatus::Configured),
                    _ => payload::<ServiceStatus>(server, name, &result)
                        .ok()
                        .and_then(|s| ServerStatus::from_service(&s.status))
                        .or(status),
                };
                results.push((name, result));
            }
            Err(source) => {
                reporter.warn(&format!("{name} failed; later steps skipped"));
                return Err(OrchestrationError::StepFailed {
                    server: server.id.clone(),
                    step: name,
                    completed: results.iter().map(|(n, _)| *n).collect(),
                    source: Box::new(source),
                });
            }
        }
    }
    Ok(ProvisionOutcome { results, status })
}

/// Result of a completed reinstall.
#[derive(Debug)]
pub struct ReinstallReport {
    pub result: AgentResult,
    pub steps: Vec<String>,
    pub service_running: bool,
    pub status: ServerStatus,
}

/// Purge and rebuild the server from scratch. Destroys the CA and every
/// issued certificate, so nothing is sent without `confirmed`.
///
/// # Errors
///
/// Returns [`OrchestrationError::NotConfirmed`] before any contact when
/// `confirmed` is false, and [`OrchestrationError::PartialFailure`] with the
/// completed steps when the agent stops partway.
pub async fn reinstall(
    transport: &impl AgentTransport,
    gate: &impl OperationGate,
    server: &Server,
    settings: VpnSettings,
    confirmed: bool,
) -> Result<ReinstallReport, OrchestrationError> {
    if !confirmed {
        return Err(OrchestrationError::NotConfirmed(server.id.clone()));
    }
    let _permit = gate.try_exclusive(&server.id)?;
    tracing::info!(server = %server.id, "reinstalling; existing PKI will be destroyed");

    let command = AgentCommand::Reinstall(settings);
    let result = dispatch(transport, server, &command).await?;
    let steps = result.steps.clone().unwrap_or_default();
    if !result.success {
        return Err(OrchestrationError::PartialFailure {
            server: server.id.clone(),
            completed: steps,
            result: Box::new(result),
        });
    }

    let service_running = payload::<ReinstallOutcome>(server, CommandName::Reinstall, &result)
        .map(|o| o.service_running)
        .unwrap_or(true);
    Ok(ReinstallReport {
        status: if service_running {
            ServerStatus::Running
        } else {
            ServerStatus::Stopped
        },
        steps,
        service_running,
        result,
    })
}
