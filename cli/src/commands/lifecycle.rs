//! `fleetvpn install | configure | provision | reinstall | start | stop |
//! restart` — VPN service lifecycle on one server.

use std::net::Ipv4Addr;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use fleetvpn_common::{CaSubject, VpnProtocol, VpnSettings};

use crate::api::{OperationResponse, OperationStep, ProvisionResponse, ReinstallResponse};
use crate::app::AppContext;
use crate::application::services::lifecycle::{self as service, ServiceAction};
use crate::commands::{ServerArg, load_entry, prompt, settle, spin};
use crate::domain::ServerEntry;

/// VPN parameters written into the server configuration.
#[derive(Args, Debug, Clone)]
pub struct VpnArgs {
    /// Port the VPN listens on
    #[arg(long, default_value_t = 1194)]
    pub vpn_port: u16,
    /// Transport protocol
    #[arg(long, value_enum, default_value_t = VpnProtocol::Udp)]
    pub protocol: VpnProtocol,
    /// Client address pool
    #[arg(long, default_value = "10.8.0.0")]
    pub subnet: Ipv4Addr,
    #[arg(long, default_value = "255.255.255.0")]
    pub netmask: Ipv4Addr,
    /// DNS server pushed to clients (repeatable)
    #[arg(long = "dns", default_values = ["8.8.8.8", "8.8.4.4"])]
    pub dns_servers: Vec<Ipv4Addr>,
    /// Organization named in the CA certificate
    #[arg(long)]
    pub ca_org: Option<String>,
    /// Contact email in the CA certificate
    #[arg(long)]
    pub ca_email: Option<String>,
}

impl VpnArgs {
    #[must_use]
    pub fn settings(&self) -> VpnSettings {
        let mut ca_subject = CaSubject::default();
        if let Some(org) = &self.ca_org {
            ca_subject.organization.clone_from(org);
        }
        if let Some(email) = &self.ca_email {
            ca_subject.email.clone_from(email);
        }
        VpnSettings {
            port: self.vpn_port,
            protocol: self.protocol,
            subnet: self.subnet,
            netmask: self.netmask,
            dns_servers: self.dns_servers.clone(),
            ca_subject,
        }
    }
}

fn remember_endpoint(entry: &mut ServerEntry, settings: &VpnSettings) {
    entry.server.vpn_port = settings.port;
    entry.server.vpn_protocol = settings.protocol;
}

/// Arguments for `configure`.
#[derive(Args)]
pub struct ConfigureArgs {
    #[command(flatten)]
    pub target: ServerArg,
    #[command(flatten)]
    pub vpn: VpnArgs,
    /// Rewrite the configuration even if one exists
    #[arg(long)]
    pub force: bool,
}

/// Arguments for `provision`.
#[derive(Args)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub target: ServerArg,
    #[command(flatten)]
    pub vpn: VpnArgs,
}

/// Arguments for `reinstall`.
#[derive(Args)]
pub struct ReinstallArgs {
    #[command(flatten)]
    pub target: ServerArg,
    #[command(flatten)]
    pub vpn: VpnArgs,
    /// Confirm that the CA and every client certificate will be destroyed
    #[arg(long)]
    pub confirm: bool,
}

/// Run `fleetvpn install <server>`.
///
/// # Errors
///
/// Returns an error if the server is unknown, busy, or the install fails.
pub async fn install(app: &AppContext, args: &ServerArg) -> Result<ExitCode> {
    let entry = load_entry(app, &args.server).await?;
    let transport = app.transport()?;
    let outcome = spin(
        app,
        &entry.server,
        "Installing OpenVPN and Easy-RSA...",
        service::install(&transport, &app.gate, &entry.server),
    )
    .await;
    let outcome = settle(app, &args.server, outcome, |e, o| {
        if let Some(status) = o.status {
            e.server.status = status;
        }
    })
    .await?;
    app.renderer()
        .operation(&OperationResponse::from_result(&outcome.result, outcome.status))?;
    Ok(ExitCode::SUCCESS)
}

/// Run `fleetvpn configure <server>`.
///
/// # Errors
///
/// Returns an error if the server is unknown, busy, or configuration fails.
pub async fn configure(app: &AppContext, args: &ConfigureArgs) -> Result<ExitCode> {
    let entry = load_entry(app, &args.target.server).await?;
    let settings = args.vpn.settings();
    let transport = app.transport()?;
    let outcome = spin(
        app,
        &entry.server,
        "Building PKI and server configuration...",
        service::configure(
            &transport,
            &app.gate,
            &entry.server,
            settings.clone(),
            args.force,
        ),
    )
    .await;
    let outcome = settle(app, &args.target.server, outcome, |e, o| {
        remember_endpoint(e, &settings);
        if let Some(status) = o.status {
            e.server.status = status;
        }
    })
    .await?;
    app.renderer()
        .operation(&OperationResponse::from_result(&outcome.result, outcome.status))?;
    Ok(ExitCode::SUCCESS)
}

/// Run `fleetvpn provision <server>`: install, configure, start.
///
/// # Errors
///
/// Returns an error naming the step that failed.
pub async fn provision(app: &AppContext, args: &ProvisionArgs) -> Result<ExitCode> {
    let entry = load_entry(app, &args.target.server).await?;
    let settings = args.vpn.settings();
    let transport = app.transport()?;
    let reporter = app.reporter();
    let outcome = service::provision(
        &transport,
        &app.gate,
        &entry.server,
        settings.clone(),
        &reporter,
    )
    .await;
    let outcome = settle(app, &args.target.server, outcome, |e, o| {
        remember_endpoint(e, &settings);
        if let Some(status) = o.status {
            e.server.status = status;
        }
    })
    .await?;
    app.renderer().provision(&ProvisionResponse {
        success: true,
        steps: outcome
            .results
            .iter()
            .map(|(command, result)| OperationStep {
                command: command.to_string(),
                message: result.message.clone(),
            })
            .collect(),
        status: outcome.status,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Run `fleetvpn reinstall <server> --confirm`.
///
/// Without `--confirm` an interactive operator is asked to type the server
/// id; a non-interactive run is refused before the server is contacted.
///
/// # Errors
///
/// Returns an error if not confirmed, or the steps completed before a
/// failure.
pub async fn reinstall(app: &AppContext, args: &ReinstallArgs) -> Result<ExitCode> {
    let entry = load_entry(app, &args.target.server).await?;
    let confirmed = args.confirm || prompt::confirm_destructive(app, &entry.server, "Reinstall")?;
    let settings = args.vpn.settings();
    let transport = app.transport()?;
    let outcome = spin(
        app,
        &entry.server,
        "Reinstalling...",
        service::reinstall(
            &transport,
            &app.gate,
            &entry.server,
            settings.clone(),
            confirmed,
        ),
    )
    .await;
    let report = settle(app, &args.target.server, outcome, |e, r| {
        remember_endpoint(e, &settings);
        e.server.status = r.status;
    })
    .await?;
    if !entry.clients.is_empty() {
        app.output.warn(&format!(
            "{} client record(s) refer to the old CA; run `fleetvpn sync {}`",
            entry.clients.len(),
            args.target.server
        ));
    }
    app.renderer().reinstall(&ReinstallResponse {
        success: true,
        message: report.result.message.clone(),
        steps: report.steps,
        service_running: report.service_running,
        status: report.status,
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Run `fleetvpn start|stop|restart <server>`.
///
/// # Errors
///
/// Returns an error if the server is unknown, busy, or systemd refuses.
pub async fn control(app: &AppContext, args: &ServerArg, action: ServiceAction) -> Result<ExitCode> {
    let entry = load_entry(app, &args.server).await?;
    let transport = app.transport()?;
    let outcome = service::control(&transport, &app.gate, &entry.server, action).await;
    let outcome = settle(app, &args.server, outcome, |e, o| {
        if let Some(status) = o.status {
            e.server.status = status;
        }
    })
    .await?;
    app.renderer()
        .operation(&OperationResponse::from_result(&outcome.result, outcome.status))?;
    Ok(ExitCode::SUCCESS)
}
