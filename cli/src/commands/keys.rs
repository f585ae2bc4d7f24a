//! `fleetvpn generate-ssh-key <server>` — switch a server from password to
//! key authentication.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use fleetvpn_common::KeyType;

use crate::api::SshKeyResponse;
use crate::app::AppContext;
use crate::application::ports::{CredentialSource, InventoryStore, KeyStore};
use crate::application::services::credentials as service;
use crate::commands::{ServerArg, load_entry};
use crate::domain::AuthMethod;

/// Arguments for `generate-ssh-key`.
#[derive(Args)]
pub struct GenerateKeyArgs {
    #[command(flatten)]
    pub target: ServerArg,
    /// Key algorithm
    #[arg(long, value_enum, default_value_t = KeyType::Ed25519)]
    pub key_type: KeyType,
    /// Refuse password authentication for this server from now on
    #[arg(long)]
    pub clear_password: bool,
}

/// Generate a key pair, authorize it using the server's password, store the
/// private half under the fleet home, and record key authentication.
///
/// # Errors
///
/// Returns an error if no password is available, the agent refuses the key,
/// or the key cannot be stored.
pub async fn run(app: &AppContext, args: &GenerateKeyArgs) -> Result<ExitCode> {
    let id = &args.target.server;
    let entry = load_entry(app, id).await?;
    let password = app.credentials().password_for(&entry.server)?;
    let transport = app.transport()?;

    let installed = service::generate_ssh_key(
        &transport,
        &app.keygen,
        &app.gate,
        &entry.server,
        password,
        args.key_type,
    )
    .await?;
    let private_key = app.keys.store(id, &installed.private_key)?;
    if installed.already_present {
        app.output.info("The server already trusted this key");
    }

    let mut inventory = app.inventory.load().await?;
    let server = &mut inventory.entry_mut(id)?.server;
    server.auth = AuthMethod::Key {
        private_key: private_key.clone(),
    };
    server.ssh_key_type = Some(installed.key_type);
    if args.clear_password {
        server.password_login = false;
    }
    app.inventory.save(&inventory).await?;
    tracing::info!(server = %id, key_type = %installed.key_type, "switched to key authentication");

    app.renderer().ssh_key(&SshKeyResponse {
        success: true,
        public_key: installed.public_key,
        key_type: installed.key_type,
        private_key_path: private_key.display().to_string(),
        password_cleared: args.clear_password,
    })?;
    Ok(ExitCode::SUCCESS)
}
