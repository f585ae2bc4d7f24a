//! Application service — reconcile local client records with the CA.

use std::collections::BTreeSet;

use fleetvpn_common::ClientName;

use crate::application::ports::{AgentTransport, OperationGate};
use crate::application::services::certificates;
use crate::domain::{ClientRecord, OrchestrationError, ReconciliationReport, Server, reconcile};

/// Compare the names the CA holds with the names recorded locally.
///
/// Revoked certificates still count as present on the server. The report
/// lists records the CA no longer has (`orphaned_clients`) and certificates
/// with no record (`new_clients`). Certificates under names that are not
/// valid client names land in `unrecognized_clients`. Applying the report is
/// left to the caller.
///
/// # Errors
///
/// Returns [`OrchestrationError::Busy`] during a lifecycle operation, or any
/// dispatch error.
pub async fn sync_clients(
    transport: &impl AgentTransport,
    gate: &impl OperationGate,
    server: &Server,
    recorded: &[ClientRecord],
) -> Result<ReconciliationReport, OrchestrationError> {
    let listing = certificates::list_clients(transport, gate, server).await?;
    let remote: BTreeSet<ClientName> = listing.names().cloned().collect();
    let local: BTreeSet<ClientName> = recorded.iter().map(|c| c.name.clone()).collect();
    let report = reconcile(&remote, &local).with_unrecognized(listing.unrecognized);
    if !report.unrecognized_clients.is_empty() {
        tracing::warn!(
            server = %server.id,
            names = ?report.unrecognized_clients,
            "certificates with foreign common names on the server"
        );
    }
    tracing::info!(
        server = %server.id,
        orphaned = report.orphaned_clients.len(),
        new = report.new_clients.len(),
        unrecognized = report.unrecognized_clients.len(),
        "client records reconciled"
    );
    Ok(report)
}
