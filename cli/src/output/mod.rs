//! Output formatting module

pub mod human;
pub mod json;
pub mod progress;
pub mod reporter;
pub mod styles;

use anyhow::Result;
use console::Term;
use fleetvpn_common::ClientListing;
use owo_colors::OwoColorize as _;
use serde::Serialize;

pub use human::HumanRenderer;
pub use json::JsonRenderer;
pub use reporter::TerminalReporter;
pub use styles::Styles;

use crate::api::{
    ClientSummary, CreateClientResponse, DeployResponse, DisconnectResponse, DownloadResponse,
    MonitorResponse, OperationResponse, ProvisionResponse, ReinstallResponse, RevokeResponse,
    ServerSummary, SshKeyResponse, StatsResponse, StatusResponse, SyncResponse,
};

/// Output context carrying styling and terminal state.
pub struct OutputContext {
    /// Stylesheet for colored output.
    pub styles: Styles,
    /// Whether stdout is a TTY.
    pub is_tty: bool,
    /// Whether to suppress non-error output.
    pub quiet: bool,
}

impl OutputContext {
    /// Create output context based on CLI flags and environment.
    #[must_use]
    pub fn new(no_color: bool, quiet: bool) -> Self {
        let is_tty = Term::stdout().is_term();
        let use_colors = !no_color && is_tty && std::env::var("NO_COLOR").is_err();

        let mut styles = Styles::default();
        if use_colors {
            styles.colorize();
        }

        Self {
            styles,
            is_tty,
            quiet,
        }
    }

    /// Check if progress indicators should be shown.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        self.is_tty && !self.quiet
    }

    /// Print a success message prefixed with `✓`. Suppressed when `quiet`.
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "✓".style(self.styles.success));
        }
    }

    /// Print a warning message prefixed with `⚠`. Suppressed when `quiet`.
    pub fn warn(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "⚠".style(self.styles.warning));
        }
    }

    /// Print an error message prefixed with `✗` to stderr. Never suppressed.
    pub fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "✗".style(self.styles.error));
    }

    /// Print an info message prefixed with `ℹ`. Suppressed when `quiet`.
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {} {msg}", "ℹ".style(self.styles.info));
        }
    }

    /// Print a section header. Suppressed when `quiet`.
    pub fn header(&self, msg: &str) {
        if !self.quiet {
            println!("  {}", msg.style(self.styles.header));
        }
    }

    /// Print a key-value pair with the key dimmed. Suppressed when `quiet`.
    pub fn kv(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {}  {value}", key.style(self.styles.dim));
        }
    }
}

// ── Renderer ──────────────────────────────────────────────────────────────────

/// Picks human or JSON rendering for each response.
pub enum Renderer<'a> {
    Human(HumanRenderer<'a>),
    Json(JsonRenderer),
}

impl Renderer<'_> {
    fn render<T: Serialize + ?Sized>(&self, value: &T, human: impl FnOnce(&HumanRenderer<'_>)) -> Result<()> {
        match self {
            Self::Human(h) => {
                human(h);
                Ok(())
            }
            Self::Json(j) => j.emit(value),
        }
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn operation(&self, r: &OperationResponse) -> Result<()> {
        self.render(r, |h| h.operation(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn provision(&self, r: &ProvisionResponse) -> Result<()> {
        self.render(r, |h| h.provision(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn reinstall(&self, r: &ReinstallResponse) -> Result<()> {
        self.render(r, |h| h.reinstall(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn status(&self, r: &StatusResponse) -> Result<()> {
        self.render(r, |h| h.status(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn monitor(&self, r: &MonitorResponse) -> Result<()> {
        self.render(r, |h| h.monitor(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn stats(&self, r: &StatsResponse) -> Result<()> {
        self.render(r, |h| h.stats(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn disconnect(&self, r: &DisconnectResponse) -> Result<()> {
        self.render(r, |h| h.disconnect(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn client_created(&self, r: &CreateClientResponse) -> Result<()> {
        self.render(r, |h| h.client_created(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn download(&self, r: &DownloadResponse) -> Result<()> {
        self.render(r, |h| h.download(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn revoke(&self, r: &RevokeResponse) -> Result<()> {
        self.render(r, |h| h.revoke(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn sync(&self, r: &SyncResponse) -> Result<()> {
        self.render(r, |h| h.sync(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn ssh_key(&self, r: &SshKeyResponse) -> Result<()> {
        self.render(r, |h| h.ssh_key(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn deploy(&self, r: &DeployResponse) -> Result<()> {
        self.render(r, |h| h.deploy(r))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn servers(&self, servers: &[ServerSummary]) -> Result<()> {
        self.render(servers, |h| h.servers(servers))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn clients(&self, clients: &[ClientSummary]) -> Result<()> {
        self.render(clients, |h| h.clients(clients))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn ca_clients(&self, listing: &ClientListing) -> Result<()> {
        self.render(listing, |h| h.ca_clients(listing))
    }
}
