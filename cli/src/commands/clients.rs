//! `fleetvpn client` — issue, list, download, and revoke client
//! certificates.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use fleetvpn_common::ClientName;

use crate::api::{ClientSummary, CreateClientResponse, DownloadResponse, RevokeResponse};
use crate::app::AppContext;
use crate::application::services::certificates as service;
use crate::commands::{load_entry, settle};
use crate::domain::{OrchestrationError, ServerId};
use crate::infra::fs::set_mode;

/// Client subcommands.
#[derive(Subcommand)]
pub enum ClientCommand {
    /// Issue a client certificate and build its .ovpn bundle
    Create {
        server: ServerId,
        /// Client name ([A-Za-z0-9_-]+)
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// List clients recorded for a server
    List {
        server: ServerId,
        /// Ask the server's CA instead of the local records
        #[arg(long)]
        remote: bool,
    },
    /// Save a client's .ovpn bundle locally
    Download {
        server: ServerId,
        name: ClientName,
        /// Destination file (default: ./<name>.ovpn)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Revoke a client certificate
    Revoke {
        server: ServerId,
        name: ClientName,
    },
}

/// Run the client command.
///
/// # Errors
///
/// Returns an error if the server is unknown, the request is invalid, or
/// the agent fails.
pub async fn run(app: &AppContext, cmd: ClientCommand) -> Result<ExitCode> {
    match cmd {
        ClientCommand::Create {
            server,
            name,
            email,
        } => create(app, &server, &name, email.as_deref()).await,
        ClientCommand::List { server, remote } => list(app, &server, remote).await,
        ClientCommand::Download {
            server,
            name,
            output,
        } => {
            let path = output.unwrap_or_else(|| PathBuf::from(format!("{name}.ovpn")));
            download(app, &server, &name, &path).await
        }
        ClientCommand::Revoke { server, name } => revoke(app, &server, &name).await,
    }
}

async fn create(
    app: &AppContext,
    id: &ServerId,
    name: &str,
    email: Option<&str>,
) -> Result<ExitCode> {
    let entry = load_entry(app, id).await?;
    let transport = app.transport()?;
    let outcome = service::create_client(
        &transport,
        &app.gate,
        &entry.server,
        &entry.clients,
        name,
        email,
        Utc::now(),
    )
    .await;
    let issued = settle(app, id, outcome, |e, issued| {
        e.clients.push(issued.record.clone());
    })
    .await?;
    app.renderer().client_created(&CreateClientResponse {
        success: true,
        client_id: issued.record.name.to_string(),
        bundle_path: issued.bundle_path,
        output: Some(issued.result.output).filter(|o| !o.is_empty()),
    })?;
    Ok(ExitCode::SUCCESS)
}

async fn list(app: &AppContext, id: &ServerId, remote: bool) -> Result<ExitCode> {
    let entry = load_entry(app, id).await?;
    if remote {
        let transport = app.transport()?;
        let listing = service::list_clients(&transport, &app.gate, &entry.server).await?;
        app.renderer().ca_clients(&listing)?;
    } else {
        let clients: Vec<ClientSummary> = entry.clients.iter().map(ClientSummary::from).collect();
        app.renderer().clients(&clients)?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn download(
    app: &AppContext,
    id: &ServerId,
    name: &ClientName,
    path: &Path,
) -> Result<ExitCode> {
    let entry = load_entry(app, id).await?;
    let transport = app.transport()?;

    // The bundle carries the client's private key.
    let partial = path.with_extension("ovpn.part");
    let mut file = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("cannot create {}", partial.display()))?;
    set_mode(&partial, 0o600)?;

    let fetched =
        service::download_config(&transport, &app.gate, &entry.server, name, &mut file).await;
    let bytes = match fetched {
        Ok(bytes) => bytes,
        Err(err) => {
            drop(file);
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err.into());
        }
    };
    file.sync_all()
        .await
        .with_context(|| format!("cannot write {}", partial.display()))?;
    drop(file);
    tokio::fs::rename(&partial, path)
        .await
        .with_context(|| format!("cannot save {}", path.display()))?;

    app.renderer().download(&DownloadResponse {
        success: true,
        client_id: name.to_string(),
        path: path.display().to_string(),
        bytes,
    })?;
    Ok(ExitCode::SUCCESS)
}

async fn revoke(app: &AppContext, id: &ServerId, name: &ClientName) -> Result<ExitCode> {
    let entry = load_entry(app, id).await?;
    let record = entry
        .client(name)
        .ok_or_else(|| OrchestrationError::UnknownClient(name.clone(), id.clone()))?;
    let transport = app.transport()?;
    let outcome = service::revoke_client(&transport, &app.gate, &entry.server, record).await;
    let now = Utc::now();
    let revocation = settle(app, id, outcome, |e, _| {
        if let Ok(record) = e.client_mut(name) {
            record.revoke(now);
        }
    })
    .await?;

    let message = if revocation.already_revoked {
        format!("Client '{name}' was already revoked")
    } else {
        format!("Client '{name}' revoked")
    };
    app.renderer().revoke(&RevokeResponse {
        success: true,
        message,
        already_revoked: revocation.already_revoked,
    })?;
    Ok(ExitCode::SUCCESS)
}
