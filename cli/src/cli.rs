//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::application::services::lifecycle::ServiceAction;
use crate::commands::{self, ServerArg};

/// Manage a fleet of OpenVPN servers over SSH
#[derive(Parser)]
#[command(
    name = "fleetvpn",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Log transport and agent activity to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Never prompt (also set by `CI` / `FLEETVPN_YES`)
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage the server inventory
    #[command(subcommand)]
    Server(commands::server::ServerCommand),

    /// Install OpenVPN and Easy-RSA
    Install(ServerArg),

    /// Build the PKI and write the server configuration
    Configure(commands::lifecycle::ConfigureArgs),

    /// Install, configure, and start in one go
    Provision(commands::lifecycle::ProvisionArgs),

    /// Wipe and rebuild the VPN, destroying every client certificate
    Reinstall(commands::lifecycle::ReinstallArgs),

    /// Start the VPN service
    Start(ServerArg),

    /// Stop the VPN service
    Stop(ServerArg),

    /// Restart the VPN service
    Restart(ServerArg),

    /// Show service state
    Status(ServerArg),

    /// Show connected clients and traffic
    Stats(ServerArg),

    /// End a client's live session
    Disconnect(commands::monitoring::DisconnectArgs),

    /// Check every server's VPN service, repeating on an interval
    Monitor(commands::monitoring::MonitorArgs),

    /// Manage client certificates
    #[command(subcommand)]
    Client(commands::clients::ClientCommand),

    /// Reconcile client records with the server's CA
    Sync(ServerArg),

    /// Replace password login with a generated SSH key
    GenerateSshKey(commands::keys::GenerateKeyArgs),

    /// Manage the stunnel TLS front end
    #[command(subcommand)]
    Stunnel(commands::stunnel::StunnelCommand),

    /// Upload the agent binary to a server
    DeployAgent(commands::deploy::DeployArgs),
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            verbose: _,
            yes,
            command,
        } = self;
        let app = AppContext::new(&AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes },
        })?;

        match command {
            Command::Server(cmd) => commands::server::run(&app, cmd).await,
            Command::Install(args) => commands::lifecycle::install(&app, &args).await,
            Command::Configure(args) => commands::lifecycle::configure(&app, &args).await,
            Command::Provision(args) => commands::lifecycle::provision(&app, &args).await,
            Command::Reinstall(args) => commands::lifecycle::reinstall(&app, &args).await,
            Command::Start(args) => {
                commands::lifecycle::control(&app, &args, ServiceAction::Start).await
            }
            Command::Stop(args) => {
                commands::lifecycle::control(&app, &args, ServiceAction::Stop).await
            }
            Command::Restart(args) => {
                commands::lifecycle::control(&app, &args, ServiceAction::Restart).await
            }
            Command::Status(args) => commands::monitoring::status(&app, &args).await,
            Command::Stats(args) => commands::monitoring::stats(&app, &args).await,
            Command::Monitor(args) => commands::monitoring::monitor(&app, &args).await,
            Command::Disconnect(args) => commands::monitoring::disconnect(&app, &args).await,
            Command::Client(cmd) => commands::clients::run(&app, cmd).await,
            Command::Sync(args) => commands::sync::run(&app, &args).await,
            Command::GenerateSshKey(args) => commands::keys::run(&app, &args).await,
            Command::Stunnel(cmd) => commands::stunnel::run(&app, cmd).await,
            Command::DeployAgent(args) => commands::deploy::run(&app, &args).await,
        }
    }
}
