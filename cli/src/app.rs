//! Application context — unified state passed to every command handler.
//!
//! `AppContext` owns the output context and the production port
//! implementations. The SSH transport is built on demand so commands that
//! only touch the inventory never read the configuration file.

use anyhow::Result;

use fleetvpn_common::TokioCommandRunner;

use crate::application::ports::ConfigStore;
use crate::commands::prompt::PromptCredentials;
use crate::infra::config::YamlConfigStore;
use crate::infra::fs::fleet_home;
use crate::infra::inventory::JsonInventoryStore;
use crate::infra::keys::{FileKeyStore, SshKeyGenerator};
use crate::infra::locks::LockFileGate;
use crate::infra::ssh::SshTransport;
use crate::output::{HumanRenderer, JsonRenderer, OutputContext, Renderer, TerminalReporter};

/// Production transport: system `ssh`/`scp`, passwords from the prompt.
pub type Transport = SshTransport<TokioCommandRunner, PromptCredentials>;

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `FLEETVPN_YES` env vars).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Server and client records.
    pub inventory: JsonInventoryStore,
    pub config_store: YamlConfigStore,
    /// Per-server operation locks shared by every `fleetvpn` process.
    pub gate: LockFileGate,
    pub keys: FileKeyStore,
    pub keygen: SshKeyGenerator,
    /// When `true`, never prompt.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `FLEETVPN_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new(flags: &AppFlags) -> Result<Self> {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("FLEETVPN_YES").is_ok();
        let non_interactive = flags.behaviour.yes || ci_env;

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        Ok(Self {
            // JSON mode keeps stdout for the response object alone.
            output: OutputContext::new(
                flags.output.no_color,
                flags.output.quiet || flags.output.json,
            ),
            mode,
            inventory: JsonInventoryStore::new()?,
            config_store: YamlConfigStore,
            gate: LockFileGate::new()?,
            keys: FileKeyStore::new()?,
            keygen: SshKeyGenerator,
            non_interactive,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Returns the appropriate `Renderer` variant for the current output mode.
    #[must_use]
    pub fn renderer(&self) -> Renderer<'_> {
        match self.mode {
            OutputMode::Human => Renderer::Human(HumanRenderer::new(&self.output)),
            OutputMode::Json => Renderer::Json(JsonRenderer),
        }
    }

    /// Progress reporter that stays silent in JSON mode.
    #[must_use]
    pub fn reporter(&self) -> TerminalReporter<'_> {
        TerminalReporter::new(&self.output, self.is_json())
    }

    /// Password source for this invocation.
    #[must_use]
    pub fn credentials(&self) -> PromptCredentials {
        PromptCredentials::new(!self.non_interactive)
    }

    /// Build the SSH transport from the current configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded.
    pub fn transport(&self) -> Result<Transport> {
        self.build_transport(self.credentials())
    }

    /// Transport that never prompts, for sweeps that talk to many servers
    /// at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded.
    pub fn unattended_transport(&self) -> Result<Transport> {
        self.build_transport(PromptCredentials::new(false))
    }

    fn build_transport(&self, credentials: PromptCredentials) -> Result<Transport> {
        let config = self.config_store.load()?;
        Ok(SshTransport::new(
            TokioCommandRunner::default(),
            credentials,
            config.ssh,
            fleet_home()?.join("known_hosts"),
        ))
    }
}
