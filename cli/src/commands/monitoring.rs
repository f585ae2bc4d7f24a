//! `fleetvpn status | stats | disconnect | monitor` — read-only views of a
//! server or the whole fleet, plus ending a client session.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use fleetvpn_common::ClientName;

use crate::api::{DisconnectResponse, MonitorEntry, MonitorResponse, StatsResponse, StatusResponse};
use crate::app::{AppContext, Transport};
use crate::application::ports::InventoryStore;
use crate::application::services::monitoring::{self as service, ServerCheck};
use crate::commands::{ServerArg, load_entry, settle};
use crate::domain::{OrchestrationError, Server, ServerId, ServerStatus};

/// Arguments for `disconnect`.
#[derive(Args)]
pub struct DisconnectArgs {
    pub server: ServerId,
    /// Client whose session to end
    pub name: ClientName,
}

/// Arguments for `monitor`.
#[derive(Args)]
pub struct MonitorArgs {
    /// Seconds between sweeps
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Sweep once and exit; the exit code is non-zero if any server failed
    #[arg(long)]
    pub once: bool,
}

/// Run `fleetvpn monitor`: check every configured server, record what each
/// agent reports, and repeat until interrupted.
///
/// Never prompts. Password servers need `FLEETVPN_SSH_PASSWORD`.
///
/// # Errors
///
/// Returns an error if the inventory cannot be read or written.
pub async fn monitor(app: &AppContext, args: &MonitorArgs) -> Result<ExitCode> {
    let transport = app.unattended_transport()?;
    loop {
        let response = sweep(app, &transport).await?;
        app.renderer().monitor(&response)?;
        if args.once {
            return Ok(if response.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }
        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(args.interval)) => {}
            signal = tokio::signal::ctrl_c() => {
                signal?;
                app.output.info("Monitoring stopped");
                return Ok(ExitCode::SUCCESS);
            }
        }
    }
}

/// Servers that have never been installed have no agent to ask.
fn monitored(servers: impl Iterator<Item = Server>) -> Vec<Server> {
    servers
        .filter(|s| s.status != ServerStatus::Unconfigured)
        .collect()
}

async fn sweep(app: &AppContext, transport: &Transport) -> Result<MonitorResponse> {
    let inventory = app.inventory.load().await?;
    let servers = monitored(inventory.servers.into_values().map(|e| e.server));
    let checks = service::sweep_fleet(transport, &servers).await;
    let checked_at = chrono::Utc::now();

    let mut entries = Vec::with_capacity(checks.len());
    for ServerCheck { server, outcome } in checks {
        let previous = servers
            .iter()
            .find(|s| s.id == server)
            .map_or(ServerStatus::Unknown, |s| s.status);
        let hint = outcome.as_ref().err().and_then(OrchestrationError::status_hint);
        let settled = settle(app, &server, outcome, |e, r| {
            if let Some(status) = r.status {
                e.server.status = status;
            }
        })
        .await;
        entries.push(match settled {
            Ok(report) => MonitorEntry {
                id: server.to_string(),
                recorded_status: report.status.unwrap_or(previous),
                service: Some(report.service.status.as_str().to_string()),
                connected_clients: report.service.stats.connected_clients,
                error: None,
            },
            Err(err) => MonitorEntry {
                id: server.to_string(),
                recorded_status: hint.unwrap_or(previous),
                service: None,
                connected_clients: 0,
                error: Some(format!("{err:#}")),
            },
        });
    }

    Ok(MonitorResponse {
        success: entries.iter().all(|e| e.error.is_none()),
        checked_at,
        servers: entries,
    })
}

/// Run `fleetvpn status <server>` and record what the agent reports.
///
/// # Errors
///
/// Returns an error if the server is unknown or unreachable.
pub async fn status(app: &AppContext, args: &ServerArg) -> Result<ExitCode> {
    let entry = load_entry(app, &args.server).await?;
    let transport = app.transport()?;
    let outcome = service::check_status(&transport, &entry.server).await;
    let report = settle(app, &args.server, outcome, |e, r| {
        if let Some(status) = r.status {
            e.server.status = status;
        }
    })
    .await?;
    let recorded = report.status.unwrap_or(entry.server.status);
    app.renderer()
        .status(&StatusResponse::new(&report.service, recorded))?;
    Ok(ExitCode::SUCCESS)
}

/// Run `fleetvpn stats <server>`.
///
/// # Errors
///
/// Returns an error if the server is unknown or unreachable.
pub async fn stats(app: &AppContext, args: &ServerArg) -> Result<ExitCode> {
    let entry = load_entry(app, &args.server).await?;
    let transport = app.transport()?;
    let stats = service::get_stats(&transport, &entry.server).await?;
    app.renderer().stats(&StatsResponse {
        success: true,
        connected_clients: stats.stats.connected_clients,
        bytes_received: stats.stats.bytes_received,
        bytes_sent: stats.stats.bytes_sent,
        connections: stats.connections,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Run `fleetvpn disconnect <server> <name>`.
///
/// # Errors
///
/// Returns an error if the server is unknown or the management interface
/// refuses.
pub async fn disconnect(app: &AppContext, args: &DisconnectArgs) -> Result<ExitCode> {
    let entry = load_entry(app, &args.server).await?;
    let transport = app.transport()?;
    let outcome = service::disconnect_client(&transport, &entry.server, &args.name).await?;
    let message = if outcome.disconnected {
        format!("Client '{}' disconnected", args.name)
    } else {
        format!("Client '{}' had no active session", args.name)
    };
    app.renderer().disconnect(&DisconnectResponse {
        success: true,
        message,
        disconnected: outcome.disconnected,
    })?;
    Ok(ExitCode::SUCCESS)
}
