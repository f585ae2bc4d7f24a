//! Command implementations
//!
//! Commands are the only code that writes the inventory. Each one loads the
//! record it needs, calls a service, and applies the outcome (or the
//! failure's status hint) to a freshly loaded inventory before saving.

pub mod clients;
pub mod deploy;
pub mod keys;
pub mod lifecycle;
pub mod monitoring;
pub mod prompt;
pub mod server;
pub mod stunnel;
pub mod sync;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::InventoryStore;
use crate::domain::{OrchestrationError, ServerEntry, ServerId};
use crate::output::progress;

/// Selects the server a command acts on.
#[derive(Args, Debug, Clone)]
pub struct ServerArg {
    /// Server id, as shown by `fleetvpn server list`
    pub server: ServerId,
}

/// Load the inventory entry for `id`.
///
/// # Errors
///
/// Returns an error if the inventory cannot be read or has no such server.
pub async fn load_entry(app: &AppContext, id: &ServerId) -> Result<ServerEntry> {
    let inventory = app.inventory.load().await?;
    Ok(inventory.entry(id)?.clone())
}

/// Record the outcome of a service call.
///
/// On success `apply` updates the entry. On failure the error's status hint,
/// if any, is recorded, and the error is returned unchanged.
///
/// # Errors
///
/// Returns the service error, or an error if the inventory cannot be saved.
pub async fn settle<T>(
    app: &AppContext,
    id: &ServerId,
    outcome: Result<T, OrchestrationError>,
    apply: impl FnOnce(&mut ServerEntry, &T),
) -> Result<T> {
    let mut inventory = app.inventory.load().await?;
    match outcome {
        Ok(value) => {
            apply(inventory.entry_mut(id)?, &value);
            app.inventory.save(&inventory).await?;
            Ok(value)
        }
        Err(err) => {
            if let Some(status) = err.status_hint() {
                tracing::warn!(server = %id, %status, error = %err, "recording status after failure");
                inventory.entry_mut(id)?.server.status = status;
                app.inventory.save(&inventory).await?;
            }
            Err(err.into())
        }
    }
}

/// Show a spinner while `operation` runs.
///
/// Skipped for password servers, whose first connection may prompt.
pub async fn spin<T, E>(
    app: &AppContext,
    server: &crate::domain::Server,
    message: &str,
    operation: impl std::future::Future<Output = Result<T, E>>,
) -> Result<T, E> {
    if !app.output.show_progress() || server.private_key().is_none() {
        return operation.await;
    }
    let pb = progress::spinner(message);
    let outcome = operation.await;
    match &outcome {
        Ok(_) => progress::finish_ok(&pb, message.trim_end_matches("...")),
        Err(_) => progress::finish_error(&pb),
    }
    outcome
}
