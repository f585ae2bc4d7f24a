//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared protocol
//! crate — never from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use fleetvpn_common::{AgentCommand, AgentResult, ClientName, KeyType};
use secrecy::SecretString;
use tokio::io::AsyncWrite;

use crate::application::gate::GatePermit;
use crate::domain::{
    FleetConfig, Inventory, OrchestrationError, ScopedCredential, Server, ServerId, TransportError,
};

// ── Transport Ports ───────────────────────────────────────────────────────────

/// Outcome of asking an agent for a client bundle.
#[derive(Debug)]
pub enum BundleFetch {
    /// The bundle was written to the sink; carries the byte count.
    Streamed(u64),
    /// The agent declined (for example, no such bundle).
    Rejected(AgentResult),
}

/// One authenticated request/response exchange with a server's agent.
///
/// Implementations open a session per call and retry only while the
/// session is being established; a command that may have reached the agent
/// is never sent twice.
#[allow(async_fn_in_trait)]
pub trait AgentTransport {
    /// Run `command` with the server's configured authentication.
    async fn invoke(
        &self,
        server: &Server,
        command: &AgentCommand,
        timeout: Duration,
    ) -> Result<AgentResult, TransportError>;

    /// Run `command` authenticated by `credential`, which is dropped when
    /// the call returns.
    async fn invoke_with_password(
        &self,
        server: &Server,
        credential: ScopedCredential,
        command: &AgentCommand,
        timeout: Duration,
    ) -> Result<AgentResult, TransportError>;

    /// Stream the `.ovpn` bundle for `name` into `sink`.
    async fn fetch_bundle(
        &self,
        server: &Server,
        name: &ClientName,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        timeout: Duration,
    ) -> Result<BundleFetch, TransportError>;
}

/// Copies the agent binary onto a host.
#[allow(async_fn_in_trait)]
pub trait AgentInstaller {
    /// Upload `local` to the agent path, mark it executable, and return the
    /// SHA-256 the host reports for the installed file.
    async fn install_agent(&self, server: &Server, local: &Path) -> Result<String, TransportError>;
}

/// Supplies passwords for servers that authenticate by password.
pub trait CredentialSource {
    /// # Errors
    ///
    /// Returns [`TransportError::Credential`] when no password can be had.
    fn password_for(&self, server: &Server) -> Result<ScopedCredential, TransportError>;
}

// ── Key Generation Port ───────────────────────────────────────────────────────

/// A freshly generated key pair in OpenSSH encoding.
pub struct GeneratedKeyPair {
    pub public_key: String,
    pub private_key: SecretString,
}

pub trait KeyGenerator {
    /// # Errors
    ///
    /// Returns an error if the key cannot be generated or encoded.
    fn generate(&self, key_type: KeyType, comment: &str) -> Result<GeneratedKeyPair>;
}

// ── Operation Gate Port ───────────────────────────────────────────────────────

/// Per-server mutual exclusion: lifecycle operations take the server
/// exclusively, certificate operations share it. A conflicting request is
/// refused at once rather than queued.
pub trait OperationGate {
    /// # Errors
    ///
    /// Returns [`OrchestrationError::Busy`] if any operation holds `server`.
    fn try_exclusive(&self, server: &ServerId) -> Result<GatePermit, OrchestrationError>;

    /// # Errors
    ///
    /// Returns [`OrchestrationError::Busy`] if an exclusive operation holds
    /// `server`.
    fn try_shared(&self, server: &ServerId) -> Result<GatePermit, OrchestrationError>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Storage Ports ─────────────────────────────────────────────────────────────

/// Persistence for the server and client inventory.
#[allow(async_fn_in_trait)]
pub trait InventoryStore {
    /// Load the inventory; a missing file is an empty inventory.
    async fn load(&self) -> Result<Inventory>;
    /// Persist the inventory atomically.
    async fn save(&self, inventory: &Inventory) -> Result<()>;
}

/// Abstracts configuration persistence.
pub trait ConfigStore {
    /// Load the configuration, returning defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self) -> Result<FleetConfig>;
    /// Return the path to the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    fn path(&self) -> Result<PathBuf>;
}

/// Stores generated private keys on the controller.
pub trait KeyStore {
    /// Write `private_key` for `server` with owner-only permissions and
    /// return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be written.
    fn store(&self, server: &ServerId, private_key: &SecretString) -> Result<PathBuf>;
}
