//! `fleetvpn sync <server>` — reconcile client records with the server's CA.

use std::process::ExitCode;

use anyhow::Result;

use crate::api::SyncResponse;
use crate::app::AppContext;
use crate::application::services::sync as service;
use crate::commands::{ServerArg, load_entry, settle};

/// Drop records for certificates the CA no longer knows. Certificates with
/// no record are reported, never imported.
///
/// # Errors
///
/// Returns an error if the server is unknown, busy, or unreachable.
pub async fn run(app: &AppContext, args: &ServerArg) -> Result<ExitCode> {
    let entry = load_entry(app, &args.server).await?;
    let transport = app.transport()?;
    let outcome = service::sync_clients(&transport, &app.gate, &entry.server, &entry.clients).await;
    let mut records_removed = 0;
    let mut report = settle(app, &args.server, outcome, |e, report| {
        records_removed = e.apply_reconciliation(report);
    })
    .await?;
    report.records_removed = records_removed;
    app.renderer().sync(&SyncResponse {
        success: true,
        report,
    })?;
    Ok(ExitCode::SUCCESS)
}
