//! Command dispatch and the process helpers every handler uses.
//!
//! Handlers live next to the concern they manage (`lifecycle`, `pki`,
//! `stunnel`, `authorized_keys`) as further `impl Executor` blocks. Each
//! invocation re-reads host state; nothing is cached between commands.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use fleetvpn_common::{
    AgentCommand, AgentConfig, AgentErrorCode, AgentResult, CommandRunner, ProcessSpec,
};

use crate::error::{ExecError, IoContext};
use crate::lifecycle::UnitAction;

pub struct Executor<R> {
    pub(crate) config: AgentConfig,
    pub(crate) runner: R,
}

impl<R: CommandRunner> Executor<R> {
    pub fn new(config: AgentConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Run one command to a result. Handler errors become `success=false`.
    pub async fn execute(&self, command: &AgentCommand) -> AgentResult {
        let name = command.name();
        tracing::info!(command = %name, "executing");
        let outcome = match command {
            AgentCommand::Install => self.install(false).await,
            AgentCommand::Configure(params) => self.configure(&params.settings, params.force).await,
            AgentCommand::Reinstall(settings) => self.reinstall(settings).await,
            AgentCommand::ListClients => self.list_clients().await,
            AgentCommand::CreateClient(params) => self.create_client(params).await,
            AgentCommand::RevokeClient(params) => self.revoke_client(&params.name).await,
            AgentCommand::GetStatus => self.get_status().await,
            AgentCommand::DisconnectClient(params) => self.disconnect_client(&params.name).await,
            AgentCommand::ServiceStart => self.control_service(UnitAction::Start).await,
            AgentCommand::ServiceStop => self.control_service(UnitAction::Stop).await,
            AgentCommand::ServiceRestart => self.control_service(UnitAction::Restart).await,
            AgentCommand::StunnelSetup(params) => self.stunnel_setup(params).await,
            AgentCommand::StunnelStart => self.stunnel_control(UnitAction::Start).await,
            AgentCommand::StunnelStop => self.stunnel_control(UnitAction::Stop).await,
            AgentCommand::StunnelRestart => self.stunnel_control(UnitAction::Restart).await,
            AgentCommand::AuthorizeKey(params) => self.authorize_key(params).await,
            AgentCommand::FetchBundle(params) => Err(ExecError::rejected(
                AgentErrorCode::Unsupported,
                format!("bundle for '{}' is only available as a raw stream", params.name),
            )),
        };
        match outcome {
            Ok(result) => {
                tracing::info!(command = %name, success = result.success, "finished");
                result
            }
            Err(err) => {
                tracing::warn!(command = %name, error = %err, "failed");
                err.into_result(format!("{name} failed"))
            }
        }
    }

    // ── Process helpers ───────────────────────────────────────────────────────

    pub(crate) async fn run(&self, spec: &ProcessSpec) -> Result<Output, ExecError> {
        Ok(self.runner.run(spec).await?)
    }

    /// Run `spec`, record it under `step`, and fail on a non-zero exit.
    pub(crate) async fn run_checked(
        &self,
        log: &mut OutputLog,
        step: &str,
        spec: &ProcessSpec,
    ) -> Result<Output, ExecError> {
        let output = self.run(spec).await?;
        log.record(step, &output);
        if output.status.success() {
            Ok(output)
        } else {
            Err(ExecError::CommandFailed {
                command: spec.command_line(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    pub(crate) fn easyrsa<I, S>(&self, args: I) -> ProcessSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dir = &self.config.easy_rsa_dir;
        ProcessSpec::new(dir.join("easyrsa").to_string_lossy())
            .arg("--batch")
            .args(args)
            .current_dir(dir)
            .env("EASYRSA_BATCH", "1")
    }

    pub(crate) fn systemctl(&self, action: &str, unit: &str) -> ProcessSpec {
        ProcessSpec::new("systemctl").args([action, unit])
    }

    pub(crate) fn package_timeout(&self) -> Duration {
        Duration::from_secs(self.config.package_timeout_secs)
    }
}

// ── Output log ────────────────────────────────────────────────────────────────

/// Accumulates the `output` field of a multi-step result.
#[derive(Debug, Default)]
pub struct OutputLog {
    entries: Vec<String>,
}

impl OutputLog {
    pub fn record(&mut self, step: &str, output: &Output) {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut entry = format!("=== {step} ===");
        for part in [stdout.trim(), stderr.trim()] {
            if !part.is_empty() {
                entry.push('\n');
                entry.push_str(part);
            }
        }
        self.entries.push(entry);
    }

    pub fn note(&mut self, step: &str, text: &str) {
        self.entries.push(format!("=== {step} ===\n{text}"));
    }

    pub fn into_string(self) -> String {
        self.entries.join("\n")
    }
}

// ── File helpers ──────────────────────────────────────────────────────────────

/// Write `contents` to `path` via a sibling temp file and rename, then apply
/// `mode`.
pub(crate) fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<(), ExecError> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .io_context(|| format!("creating directory {}", parent.display()))?;
    }
    let temp = path.with_extension("fleetvpn.tmp");
    std::fs::write(&temp, contents).io_context(|| format!("writing {}", temp.display()))?;
    std::fs::set_permissions(&temp, std::fs::Permissions::from_mode(mode))
        .io_context(|| format!("setting permissions on {}", temp.display()))?;
    std::fs::rename(&temp, path).io_context(|| format!("finalizing {}", path.display()))
}

pub(crate) fn read_file(path: &Path) -> Result<String, ExecError> {
    std::fs::read_to_string(path).io_context(|| format!("reading {}", path.display()))
}
