//! Infrastructure implementation of the `InventoryStore` port.
//!
//! `JsonInventoryStore` provides async load/save using
//! `tokio::task::spawn_blocking` with atomic write (temp file + rename) so a
//! crash mid-save never leaves a truncated inventory.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::InventoryStore;
use crate::domain::Inventory;
use crate::infra::fs::{fleet_home, set_mode};

/// Inventory file manager.
pub struct JsonInventoryStore {
    path: PathBuf,
}

impl JsonInventoryStore {
    /// Create a store using the default path (`~/.fleetvpn/inventory.json`).
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(fleet_home()?.join("inventory.json")))
    }

    /// Create a store with an explicit path (used in tests).
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    fn load_sync(&self) -> Result<Inventory> {
        if !self.path.exists() {
            return Ok(Inventory::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading inventory {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing inventory {}", self.path.display()))
    }

    fn save_sync(&self, inventory: &Inventory) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(inventory).context("serializing inventory")?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;
        set_mode(&temp_path, 0o600)?;
        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("finalizing inventory {}", self.path.display()))?;
        Ok(())
    }
}

impl InventoryStore for JsonInventoryStore {
    async fn load(&self) -> Result<Inventory> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || JsonInventoryStore::with_path(path).load_sync())
            .await
            .context("inventory load task panicked")?
    }

    async fn save(&self, inventory: &Inventory) -> Result<()> {
        let path = self.path.clone();
        let inventory = inventory.clone();
        tokio::task::spawn_blocking(move || JsonInventoryStore::with_path(path).save_sync(&inventory))
            .await
            .context("inventory save task panicked")?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::Utc;
    use fleetvpn_common::ClientName;

    use super::*;
    use crate::domain::{ClientRecord, Server, ServerId};

    #[tokio::test]
    async fn missing_file_is_empty_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonInventoryStore::with_path(dir.path().join("inventory.json"));
        assert!(store.load().await.unwrap().servers.is_empty());
    }

    #[tokio::test]
    async fn saved_inventory_loads_back_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("inventory.json");
        let store = JsonInventoryStore::with_path(path.clone());

        let id = ServerId::parse("fra-1").unwrap();
        let mut inventory = Inventory::default();
        inventory
            .add_server(Server::new(id.clone(), "203.0.113.7", 22, "root"))
            .unwrap();
        inventory.entry_mut(&id).unwrap().clients.push(ClientRecord::new(
            ClientName::parse("alice").unwrap(),
            None,
            Utc::now(),
        ));
        store.save(&inventory).await.unwrap();

        assert_eq!(store.load().await.unwrap(), inventory);
        assert!(!path.with_extension("json.tmp").exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = JsonInventoryStore::with_path(path).load().await.unwrap_err();
        assert!(format!("{err:#}").contains("parsing inventory"));
    }
}
