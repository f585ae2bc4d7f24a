//! `fleetvpn deploy-agent <server> <binary>` — install the agent on a host.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use crate::api::DeployResponse;
use crate::app::AppContext;
use crate::application::services::deploy as service;
use crate::commands::{ServerArg, load_entry, spin};
use crate::infra::fs::sha256_file;

/// Arguments for `deploy-agent`.
#[derive(Args)]
pub struct DeployArgs {
    #[command(flatten)]
    pub target: ServerArg,
    /// Agent binary built for the server's platform
    pub binary: PathBuf,
}

/// Upload the agent binary and verify the installed copy's digest.
///
/// # Errors
///
/// Returns an error if the binary cannot be read, the upload fails, or the
/// digests differ.
pub async fn run(app: &AppContext, args: &DeployArgs) -> Result<ExitCode> {
    let local = sha256_file(&args.binary)
        .with_context(|| format!("cannot read agent binary {}", args.binary.display()))?;
    let entry = load_entry(app, &args.target.server).await?;
    let transport = app.transport()?;
    let sha256 = spin(
        app,
        &entry.server,
        "Uploading agent...",
        service::deploy_agent(&transport, &app.gate, &entry.server, &args.binary, &local),
    )
    .await?;
    app.renderer().deploy(&DeployResponse {
        success: true,
        message: format!("Agent installed on {}", entry.server.id),
        sha256,
    })?;
    Ok(ExitCode::SUCCESS)
}
