//! The controller's record of servers and their clients.
//!
//! Only the command layer mutates an `Inventory`, and only with outcomes the
//! orchestration services returned.

use std::collections::BTreeMap;

use fleetvpn_common::ClientName;
use serde::{Deserialize, Serialize};

use crate::domain::client::ClientRecord;
use crate::domain::error::InventoryError;
use crate::domain::reconcile::ReconciliationReport;
use crate::domain::server::{Server, ServerId};

/// One server with the clients issued on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub server: Server,
    #[serde(default)]
    pub clients: Vec<ClientRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub servers: BTreeMap<ServerId, ServerEntry>,
}

impl Inventory {
    /// # Errors
    ///
    /// Returns [`InventoryError::ServerNotFound`] for an unknown id.
    pub fn entry(&self, id: &ServerId) -> Result<&ServerEntry, InventoryError> {
        self.servers
            .get(id)
            .ok_or_else(|| InventoryError::ServerNotFound(id.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`InventoryError::ServerNotFound`] for an unknown id.
    pub fn entry_mut(&mut self, id: &ServerId) -> Result<&mut ServerEntry, InventoryError> {
        self.servers
            .get_mut(id)
            .ok_or_else(|| InventoryError::ServerNotFound(id.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`InventoryError::ServerExists`] if the id is taken.
    pub fn add_server(&mut self, server: Server) -> Result<(), InventoryError> {
        if self.servers.contains_key(&server.id) {
            return Err(InventoryError::ServerExists(server.id.to_string()));
        }
        self.servers.insert(
            server.id.clone(),
            ServerEntry {
                server,
                clients: Vec::new(),
            },
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`InventoryError::ServerNotFound`] for an unknown id.
    pub fn remove_server(&mut self, id: &ServerId) -> Result<ServerEntry, InventoryError> {
        self.servers
            .remove(id)
            .ok_or_else(|| InventoryError::ServerNotFound(id.to_string()))
    }
}

impl ServerEntry {
    /// The most recent record for `name`; an active one wins over revoked
    /// history.
    #[must_use]
    pub fn client(&self, name: &ClientName) -> Option<&ClientRecord> {
        self.clients
            .iter()
            .filter(|c| &c.name == name)
            .max_by_key(|c| (c.is_active(), c.created_at))
    }

    /// # Errors
    ///
    /// Returns [`InventoryError::ClientNotFound`] if no record has that name.
    pub fn client_mut(&mut self, name: &ClientName) -> Result<&mut ClientRecord, InventoryError> {
        let server = self.server.id.to_string();
        self.clients
            .iter_mut()
            .filter(|c| &c.name == name)
            .max_by_key(|c| (c.is_active(), c.created_at))
            .ok_or_else(|| InventoryError::ClientNotFound {
                server,
                client: name.to_string(),
            })
    }

    /// Drop every record whose name is in `names`.
    pub fn remove_clients(&mut self, names: &[ClientName]) -> usize {
        let before = self.clients.len();
        self.clients.retain(|c| !names.contains(&c.name));
        before - self.clients.len()
    }

    /// Delete the records of every orphaned name and return how many
    /// records went. That can exceed `clients_removed`, which counts names.
    pub fn apply_reconciliation(&mut self, report: &ReconciliationReport) -> usize {
        self.remove_clients(&report.orphaned_clients)
    }
}
