//! `fleetvpn server` — manage the local server inventory.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Subcommand;
use fleetvpn_common::validate_host;

use crate::api::{OperationResponse, ServerSummary};
use crate::app::AppContext;
use crate::application::ports::{InventoryStore, OperationGate};
use crate::domain::{AuthMethod, Server, ServerId};

/// Server subcommands.
#[derive(Subcommand)]
pub enum ServerCommand {
    /// Add a server to the inventory
    Add {
        /// Identifier used by every other command
        id: ServerId,
        /// Hostname or IP address
        host: String,
        /// SSH port
        #[arg(long, default_value_t = 22)]
        port: u16,
        /// SSH user
        #[arg(long, default_value = "root")]
        user: String,
        /// Existing private key to authenticate with instead of a password
        #[arg(long)]
        key: Option<PathBuf>,
    },
    /// List servers in the inventory
    List,
    /// Remove a server from the inventory (the host is not touched)
    Remove {
        id: ServerId,
    },
}

/// Run the server command.
///
/// # Errors
///
/// Returns an error if the inventory cannot be read or written, or the
/// request is invalid.
pub async fn run(app: &AppContext, cmd: ServerCommand) -> Result<ExitCode> {
    match cmd {
        ServerCommand::Add {
            id,
            host,
            port,
            user,
            key,
        } => add(app, id, &host, port, user, key).await,
        ServerCommand::List => list(app).await,
        ServerCommand::Remove { id } => remove(app, &id).await,
    }
}

async fn add(
    app: &AppContext,
    id: ServerId,
    host: &str,
    port: u16,
    user: String,
    key: Option<PathBuf>,
) -> Result<ExitCode> {
    validate_host(host)?;
    let mut server = Server::new(id, host, port, user);
    if let Some(key) = key {
        let private_key = std::path::absolute(&key)
            .with_context(|| format!("cannot resolve {}", key.display()))?;
        anyhow::ensure!(private_key.is_file(), "key file {} not found", key.display());
        server.auth = AuthMethod::Key { private_key };
        server.password_login = false;
    }

    let mut inventory = app.inventory.load().await?;
    let summary = ServerSummary::new(&server, &[]);
    inventory.add_server(server)?;
    app.inventory.save(&inventory).await?;
    tracing::info!(server = %summary.id, host = %summary.host, "server added");

    app.renderer().servers(std::slice::from_ref(&summary))?;
    Ok(ExitCode::SUCCESS)
}

async fn list(app: &AppContext) -> Result<ExitCode> {
    let inventory = app.inventory.load().await?;
    let summaries: Vec<ServerSummary> = inventory
        .servers
        .values()
        .map(|entry| ServerSummary::new(&entry.server, &entry.clients))
        .collect();
    app.renderer().servers(&summaries)?;
    Ok(ExitCode::SUCCESS)
}

async fn remove(app: &AppContext, id: &ServerId) -> Result<ExitCode> {
    let _permit = app.gate.try_exclusive(id)?;
    let mut inventory = app.inventory.load().await?;
    let entry = inventory.remove_server(id)?;
    app.inventory.save(&inventory).await?;
    if let Some(key) = entry.server.private_key() {
        app.output
            .info(&format!("Private key left in place: {}", key.display()));
    }
    app.renderer()
        .operation(&OperationResponse::message(format!("Server '{id}' removed")))?;
    Ok(ExitCode::SUCCESS)
}
