//! Optional TLS front end: stunnel accepting on a public port and
//! forwarding to the local VPN listener.

use fleetvpn_common::{AgentErrorCode, AgentResult, CommandRunner, ProcessSpec, StunnelParams};

use crate::error::{ExecError, IoContext};
use crate::executor::{Executor, OutputLog, read_file, write_file};
use crate::lifecycle::{UnitAction, apt, explain_apt_failure};
use crate::templates;

const STUNNEL_PACKAGE: &str = "stunnel4";
const CERT_VALIDITY_DAYS: &str = "3650";

/// Set `ENABLED=1` in a Debian defaults file, keeping every other line.
fn enable_in_defaults(current: &str) -> String {
    let mut found = false;
    let mut lines: Vec<String> = current
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("ENABLED=") {
                found = true;
                "ENABLED=1".to_string()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !found {
        lines.push("ENABLED=1".to_string());
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

impl<R: CommandRunner> Executor<R> {
    pub(crate) async fn stunnel_setup(&self, params: &StunnelParams) -> Result<AgentResult, ExecError> {
        let mut log = OutputLog::default();

        if !self.packages_installed(&[STUNNEL_PACKAGE]).await? {
            self.run_checked(
                &mut log,
                "Installing stunnel",
                &apt(&["install", "-y", STUNNEL_PACKAGE]).timeout(self.package_timeout()),
            )
            .await
            .map_err(explain_apt_failure)?;
        }

        self.ensure_port_free(params.stunnel_port).await?;

        let dir = &self.config.stunnel_dir;
        std::fs::create_dir_all(dir).io_context(|| format!("creating {}", dir.display()))?;
        let key_path = dir.join("stunnel.key");
        let cert_path = dir.join("stunnel.crt");
        let subject = format!("/C=RU/ST=Moscow/L=Moscow/O=OpenVPN/CN={}", params.server_ip);
        self.run_checked(
            &mut log,
            "Generating stunnel certificate",
            &ProcessSpec::new("openssl").args([
                "req".to_string(),
                "-new".to_string(),
                "-x509".to_string(),
                "-days".to_string(),
                CERT_VALIDITY_DAYS.to_string(),
                "-nodes".to_string(),
                "-subj".to_string(),
                subject,
                "-keyout".to_string(),
                key_path.display().to_string(),
                "-out".to_string(),
                cert_path.display().to_string(),
            ]),
        )
        .await?;

        // stunnel wants key and certificate in one file.
        let mut pem = read_file(&key_path)?;
        if !pem.ends_with('\n') {
            pem.push('\n');
        }
        pem.push_str(&read_file(&cert_path)?);
        let pem_path = dir.join("stunnel.pem");
        write_file(&pem_path, pem.as_bytes(), 0o600)?;
        for leftover in [&key_path, &cert_path] {
            std::fs::remove_file(leftover).io_context(|| format!("removing {}", leftover.display()))?;
        }

        write_file(
            &dir.join("stunnel.conf"),
            templates::stunnel_conf(params, &pem_path).as_bytes(),
            0o644,
        )?;
        log.note("Writing stunnel configuration", &format!(
            "accept 0.0.0.0:{} -> 127.0.0.1:{}",
            params.stunnel_port, params.openvpn_port
        ));

        let defaults = &self.config.stunnel_defaults;
        let current = if defaults.exists() { read_file(defaults)? } else { String::new() };
        write_file(defaults, enable_in_defaults(&current).as_bytes(), 0o644)?;
        tracing::info!(port = params.stunnel_port, "stunnel configured");

        Ok(AgentResult::ok(format!(
            "Stunnel configured on port {}",
            params.stunnel_port
        ))
        .with_output(log.into_string())
        .with_payload(&serde_json::json!({
            "stunnel_port": params.stunnel_port,
            "openvpn_port": params.openvpn_port,
        }))?)
    }

    /// Refuse a port some other process already listens on. A running
    /// stunnel already configured to accept on that port is a
    /// reconfiguration, not a conflict.
    async fn ensure_port_free(&self, port: u16) -> Result<(), ExecError> {
        match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => {
                drop(listener);
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                if self.stunnel_holds(port).await? {
                    return Ok(());
                }
                Err(ExecError::rejected(
                    AgentErrorCode::PortConflict,
                    format!("port {port} is already in use"),
                ))
            }
            // Permission errors on privileged ports are left to stunnel itself.
            Err(err) => {
                tracing::debug!(port, error = %err, "port check inconclusive");
                Ok(())
            }
        }
    }

    /// Whether the listener on `port` is our own stunnel.
    async fn stunnel_holds(&self, port: u16) -> Result<bool, ExecError> {
        let conf = self.config.stunnel_dir.join("stunnel.conf");
        let configured = if conf.exists() {
            templates::stunnel_accept_port(&read_file(&conf)?)
        } else {
            None
        };
        if configured != Some(port) {
            tracing::debug!(port, ?configured, "port held by something other than stunnel");
            return Ok(false);
        }
        let active = self
            .run(&self.systemctl("is-active", &self.config.stunnel_unit))
            .await?;
        Ok(String::from_utf8_lossy(&active.stdout).trim() == "active")
    }

    pub(crate) async fn stunnel_control(&self, action: UnitAction) -> Result<AgentResult, ExecError> {
        let unit = self.config.stunnel_unit.clone();
        self.control_unit(&unit, action).await
    }
}
