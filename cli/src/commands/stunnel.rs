//! `fleetvpn stunnel` — TLS front end for networks that block VPN traffic.

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use crate::api::OperationResponse;
use crate::app::AppContext;
use crate::application::services::tunnel::{self as service, TunnelAction};
use crate::commands::{load_entry, settle};
use crate::domain::ServerId;

/// Stunnel subcommands.
#[derive(Subcommand)]
pub enum StunnelCommand {
    /// Install stunnel in front of the VPN port
    Setup {
        server: ServerId,
        /// Port stunnel accepts TLS on
        #[arg(long, default_value_t = 443)]
        port: u16,
    },
    Start { server: ServerId },
    Stop { server: ServerId },
    Restart { server: ServerId },
}

/// Run the stunnel command.
///
/// # Errors
///
/// Returns an error if the server is unknown, busy, or the agent fails.
pub async fn run(app: &AppContext, cmd: StunnelCommand) -> Result<ExitCode> {
    let (id, action) = match cmd {
        StunnelCommand::Setup { server, port } => (server, TunnelAction::Setup { stunnel_port: port }),
        StunnelCommand::Start { server } => (server, TunnelAction::Start),
        StunnelCommand::Stop { server } => (server, TunnelAction::Stop),
        StunnelCommand::Restart { server } => (server, TunnelAction::Restart),
    };
    let entry = load_entry(app, &id).await?;
    let transport = app.transport()?;
    let outcome = service::tunnel(&transport, &app.gate, &entry.server, action).await;
    let outcome = settle(app, &id, outcome, |e, o| {
        if let Some(enabled) = o.stunnel_enabled {
            e.server.stunnel_enabled = enabled;
        }
    })
    .await?;
    app.renderer()
        .operation(&OperationResponse::from_result(&outcome.result, None))?;
    Ok(ExitCode::SUCCESS)
}
