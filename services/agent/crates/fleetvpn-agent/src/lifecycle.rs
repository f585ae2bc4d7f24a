//! Package installation, server configuration, reinstall, and control of
//! the VPN service unit.

use fleetvpn_common::{
    AgentErrorCode, AgentResult, ClientName, CommandRunner, ProcessSpec, ReinstallOutcome,
    ServiceState, ServiceStatus, TrafficStats, VpnSettings,
};

use crate::error::{ExecError, IoContext};
use crate::executor::{Executor, OutputLog, write_file};
use crate::management::{KillOutcome, ManagementClient, ManagementError};
use crate::templates;

const PACKAGES: [&str; 3] = ["openvpn", "easy-rsa", "netcat-openbsd"];
const REQUIRED_PACKAGES: [&str; 2] = ["openvpn", "easy-rsa"];

/// Step labels reported by `reinstall`, in order.
pub const REINSTALL_STEPS: [&str; 5] = ["stopped", "purged", "installed", "configured", "started"];

/// A systemd action on a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitAction {
    Start,
    Stop,
    Restart,
}

impl UnitAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            Self::Start => "started",
            Self::Stop => "stopped",
            Self::Restart => "restarted",
        }
    }

    fn expects_running(self) -> bool {
        !matches!(self, Self::Stop)
    }
}

pub(crate) fn apt(args: &[&str]) -> ProcessSpec {
    ProcessSpec::new("apt-get")
        .args(args.iter().copied())
        .env("DEBIAN_FRONTEND", "noninteractive")
}

// A held dpkg lock is the common cause of install failures; name it.
pub(crate) fn explain_apt_failure(err: ExecError) -> ExecError {
    match err {
        ExecError::CommandFailed { ref stderr, .. }
            if stderr.contains("Could not get lock") || stderr.contains("dpkg was interrupted") =>
        {
            ExecError::rejected(
                AgentErrorCode::Internal,
                format!("package manager is locked by another process: {stderr}"),
            )
        }
        other => other,
    }
}

impl<R: CommandRunner> Executor<R> {
    // ── install ───────────────────────────────────────────────────────────────

    pub(crate) async fn install(&self, reinstall: bool) -> Result<AgentResult, ExecError> {
        if !reinstall && self.packages_installed(&REQUIRED_PACKAGES).await? {
            self.ensure_service_dirs()?;
            return Ok(AgentResult::ok("OpenVPN already installed"));
        }
        let mut log = OutputLog::default();
        match self.install_steps(&mut log, reinstall).await {
            Ok(()) => Ok(AgentResult::ok("OpenVPN installed successfully").with_output(log.into_string())),
            Err(err) => Ok(err
                .into_result("OpenVPN installation failed")
                .with_output(log.into_string())),
        }
    }

    /// Whether dpkg reports every one of `packages` as installed.
    pub(crate) async fn packages_installed(&self, packages: &[&str]) -> Result<bool, ExecError> {
        let spec = ProcessSpec::new("dpkg-query")
            .args(["-W", "-f=${Status}\n"])
            .args(packages.iter().copied());
        let output = self.run(&spec).await?;
        if !output.status.success() {
            return Ok(false);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let installed = stdout
            .lines()
            .filter(|line| line.trim() == "install ok installed")
            .count();
        Ok(installed == packages.len())
    }

    async fn install_steps(&self, log: &mut OutputLog, reinstall: bool) -> Result<(), ExecError> {
        let timeout = self.package_timeout();
        self.run_checked(log, "Updating package list", &apt(&["update"]).timeout(timeout))
            .await
            .map_err(explain_apt_failure)?;

        let mut args = vec!["install", "-y"];
        if reinstall {
            args.push("--reinstall");
        }
        args.extend(PACKAGES);
        self.run_checked(log, "Installing packages", &apt(&args).timeout(timeout))
            .await
            .map_err(explain_apt_failure)?;

        self.ensure_service_dirs()
    }

    fn ensure_service_dirs(&self) -> Result<(), ExecError> {
        for dir in [&self.config.openvpn_dir, &self.config.log_dir] {
            std::fs::create_dir_all(dir).io_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    // ── configure ─────────────────────────────────────────────────────────────

    pub(crate) async fn configure(
        &self,
        settings: &VpnSettings,
        force: bool,
    ) -> Result<AgentResult, ExecError> {
        if self.ca_exists() && !force {
            return Err(ExecError::rejected(
                AgentErrorCode::CaExists,
                "a certificate authority already exists; reconfigure explicitly to replace it",
            ));
        }
        let mut log = OutputLog::default();
        match self.configure_steps(settings, &mut log).await {
            Ok(()) => Ok(AgentResult::ok("OpenVPN configured successfully").with_output(log.into_string())),
            Err(err) => Ok(err
                .into_result("OpenVPN configuration failed")
                .with_output(log.into_string())),
        }
    }

    async fn configure_steps(&self, settings: &VpnSettings, log: &mut OutputLog) -> Result<(), ExecError> {
        self.build_pki(&settings.ca_subject, log).await?;
        self.install_server_artifacts(log).await?;

        let conf = templates::server_conf(settings, self.config.management_addr, &self.config.log_dir);
        write_file(&self.config.openvpn_dir.join("server.conf"), conf.as_bytes(), 0o644)?;
        log.note("Writing server configuration", "server.conf written");

        self.apply_system_settings(settings, log).await
    }

    /// IP forwarding and firewall openings. A host without ufw is not an
    /// error; the outcome is recorded either way.
    async fn apply_system_settings(&self, settings: &VpnSettings, log: &mut OutputLog) -> Result<(), ExecError> {
        self.run_checked(
            log,
            "Enabling IP forwarding",
            &ProcessSpec::new("sysctl").args(["-w", "net.ipv4.ip_forward=1"]),
        )
        .await?;
        write_file(&self.config.sysctl_conf, b"net.ipv4.ip_forward=1\n", 0o644)?;

        let rule = format!("{}/{}", settings.port, settings.protocol);
        for (step, args) in [
            ("Opening VPN port", vec!["allow", rule.as_str()]),
            ("Allowing SSH", vec!["allow", "OpenSSH"]),
        ] {
            self.run_best_effort(log, step, &ProcessSpec::new("ufw").args(args)).await;
        }
        Ok(())
    }

    pub(crate) async fn run_best_effort(&self, log: &mut OutputLog, step: &str, spec: &ProcessSpec) {
        match self.run(spec).await {
            Ok(output) => log.record(step, &output),
            Err(err) => {
                tracing::warn!(step, error = %err, "best-effort step failed");
                log.note(step, &format!("skipped: {err}"));
            }
        }
    }

    // ── reinstall ─────────────────────────────────────────────────────────────

    pub(crate) async fn reinstall(&self, settings: &VpnSettings) -> Result<AgentResult, ExecError> {
        let mut steps = Vec::new();
        let mut log = OutputLog::default();
        match self.reinstall_steps(settings, &mut steps, &mut log).await {
            Ok(()) => Ok(AgentResult::ok("OpenVPN reinstalled successfully")
                .with_steps(steps)
                .with_output(log.into_string())
                .with_payload(&ReinstallOutcome { service_running: true })?),
            Err(err) => {
                let failed_at = REINSTALL_STEPS.get(steps.len()).copied().unwrap_or("verify");
                tracing::warn!(failed_at, completed = steps.len(), "reinstall stopped early");
                Ok(err
                    .into_result(format!("Reinstall failed before '{failed_at}'"))
                    .with_steps(steps)
                    .with_output(log.into_string())
                    .with_payload(&ReinstallOutcome { service_running: false })?)
            }
        }
    }

    /// Each label is appended only once its step has completed; earlier
    /// steps are never undone.
    async fn reinstall_steps(
        &self,
        settings: &VpnSettings,
        steps: &mut Vec<String>,
        log: &mut OutputLog,
    ) -> Result<(), ExecError> {
        let unit = self.config.service_unit.as_str();
        self.run_best_effort(log, "Stopping service", &self.systemctl("stop", unit)).await;
        self.run_best_effort(log, "Disabling autostart", &self.systemctl("disable", unit)).await;
        steps.push(REINSTALL_STEPS[0].to_string());

        self.purge(log)?;
        steps.push(REINSTALL_STEPS[1].to_string());

        self.install_steps(log, true).await?;
        steps.push(REINSTALL_STEPS[2].to_string());

        self.configure_steps(settings, log).await?;
        steps.push(REINSTALL_STEPS[3].to_string());

        self.run_checked(log, "Starting service", &self.systemctl("start", unit)).await?;
        self.run_checked(log, "Enabling autostart", &self.systemctl("enable", unit)).await?;
        let state = self.unit_state(unit).await?;
        if !state.is_running() {
            return Err(ExecError::rejected(
                AgentErrorCode::Internal,
                format!("{unit} is {state} after start"),
            ));
        }
        steps.push(REINSTALL_STEPS[4].to_string());
        Ok(())
    }

    /// Remove all configuration, certificates and client bundles.
    fn purge(&self, log: &mut OutputLog) -> Result<(), ExecError> {
        for dir in [
            &self.config.openvpn_dir,
            &self.config.easy_rsa_dir,
            &self.config.client_configs_dir,
        ] {
            if dir.exists() {
                std::fs::remove_dir_all(dir).io_context(|| format!("removing {}", dir.display()))?;
            }
        }
        self.ensure_service_dirs()?;
        log.note("Removing old configuration", "configuration and PKI removed");
        Ok(())
    }

    // ── service state ─────────────────────────────────────────────────────────

    /// Ground-truth state of `unit` from systemd.
    pub(crate) async fn unit_state(&self, unit: &str) -> Result<ServiceState, ExecError> {
        let load = self
            .run(&ProcessSpec::new("systemctl").args(["show", "-p", "LoadState", "--value", unit]))
            .await?;
        if String::from_utf8_lossy(&load.stdout).trim() == "not-found" {
            return Err(ExecError::rejected(
                AgentErrorCode::ServiceMissing,
                format!("service unit {unit} not found"),
            ));
        }
        let active = self.run(&self.systemctl("is-active", unit)).await?;
        Ok(ServiceState::from_systemd(&String::from_utf8_lossy(&active.stdout)))
    }

    pub(crate) async fn control_service(&self, action: UnitAction) -> Result<AgentResult, ExecError> {
        let unit = self.config.service_unit.clone();
        self.control_unit(&unit, action).await
    }

    /// Apply `action` to `unit` and confirm the resulting state. Starting a
    /// running unit is a success.
    pub(crate) async fn control_unit(&self, unit: &str, action: UnitAction) -> Result<AgentResult, ExecError> {
        self.unit_state(unit).await?;
        let mut log = OutputLog::default();
        self.run_checked(&mut log, action.as_str(), &self.systemctl(action.as_str(), unit))
            .await?;
        let state = self.unit_state(unit).await?;
        let status = ServiceStatus {
            service_running: state.is_running(),
            status: state.clone(),
            connections: Vec::new(),
            stats: TrafficStats::default(),
        };
        let result = if state.is_running() == action.expects_running() {
            AgentResult::ok(format!("{unit} {}", action.past_tense()))
        } else {
            AgentResult::failed(
                format!("{unit} did not {}", action.as_str()),
                format!("{unit} is {state}"),
            )
            .with_code(AgentErrorCode::Internal)
        };
        Ok(result.with_output(log.into_string()).with_payload(&status)?)
    }

    // ── status and sessions ───────────────────────────────────────────────────

    pub(crate) async fn get_status(&self) -> Result<AgentResult, ExecError> {
        let state = self.unit_state(&self.config.service_unit).await?;
        let mut note = None;
        let connections = if state.is_running() {
            match ManagementClient::new(self.config.management_addr).status().await {
                Ok(connections) => connections,
                Err(err) => {
                    tracing::warn!(error = %err, "falling back to systemd state");
                    note = Some(err.to_string());
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let status = ServiceStatus {
            service_running: state.is_running(),
            stats: TrafficStats::from_connections(&connections),
            status: state,
            connections,
        };
        let mut result = AgentResult::ok(format!(
            "Service is {}; {} active connection(s)",
            status.status, status.stats.connected_clients
        ))
        .with_payload(&status)?;
        if let Some(note) = note {
            result = result.with_output(note);
        }
        Ok(result)
    }

    pub(crate) async fn disconnect_client(&self, name: &ClientName) -> Result<AgentResult, ExecError> {
        let outcome = match ManagementClient::new(self.config.management_addr).kill(name).await {
            Ok(outcome) => outcome,
            // With the daemon down there is no session to end.
            Err(err @ ManagementError::Unreachable { .. }) => {
                if self.unit_state(&self.config.service_unit).await?.is_running() {
                    return Err(err.into());
                }
                KillOutcome::NotConnected
            }
            Err(err) => return Err(err.into()),
        };
        let (result, disconnected) = match outcome {
            KillOutcome::Killed(detail) => (
                AgentResult::ok(format!("Client '{name}' disconnected")).with_output(detail),
                true,
            ),
            KillOutcome::NotConnected => (
                AgentResult::ok(format!("Client '{name}' is not connected; nothing to do")),
                false,
            ),
        };
        Ok(result.with_payload(&serde_json::json!({
            "client_name": name,
            "disconnected": disconnected,
        }))?)
    }
}
