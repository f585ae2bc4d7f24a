//! `ssh`-based implementation of the agent transport ports.
//!
//! Each call spawns one `ssh` process that runs the agent with the request
//! on stdin. Password authentication goes through `sshpass -e`, so the
//! password only ever travels in the child's environment.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use fleetvpn_common::{
    AgentCommand, AgentResult, ClientName, ClientParams, CommandName, CommandRunner, ProcessError,
    ProcessSpec,
};
use tokio::io::AsyncWrite;

use crate::application::ports::{AgentInstaller, AgentTransport, BundleFetch, CredentialSource};
use crate::domain::{ScopedCredential, Server, SshSettings, TransportError};

/// stderr fragments ssh prints when the session never came up.
const CONNECT_FAILURES: &[&str] = &[
    "Connection refused",
    "Connection timed out",
    "Could not resolve hostname",
    "No route to host",
    "Network is unreachable",
    "Connection closed by remote host",
    "Host key verification failed",
];

const SSH_ERROR_EXIT: i32 = 255;
const SSHPASS_BAD_PASSWORD: i32 = 5;
const SSHPASS_HOST_KEY_UNKNOWN: i32 = 6;

enum Auth {
    Key(PathBuf),
    Password(ScopedCredential),
}

impl Auth {
    fn is_password(&self) -> bool {
        matches!(self, Self::Password(_))
    }
}

/// Agent transport over the system `ssh` client.
pub struct SshTransport<R, C> {
    runner: R,
    credentials: C,
    settings: SshSettings,
    known_hosts: PathBuf,
}

impl<R: CommandRunner, C: CredentialSource> SshTransport<R, C> {
    #[must_use]
    pub fn new(runner: R, credentials: C, settings: SshSettings, known_hosts: PathBuf) -> Self {
        Self {
            runner,
            credentials,
            settings,
            known_hosts,
        }
    }

    fn auth_for(&self, server: &Server) -> Result<Auth, TransportError> {
        match server.private_key() {
            Some(path) => Ok(Auth::Key(path.to_path_buf())),
            None => {
                server.ensure_password_login()?;
                self.credentials.password_for(server).map(Auth::Password)
            }
        }
    }

    /// Prefix for commands that need root on the host.
    fn privileged(server: &Server, command: &str) -> String {
        if server.username == "root" {
            command.to_string()
        } else {
            format!("sudo -n {command}")
        }
    }

    /// `port_flag` is `-p` for ssh and `-P` for scp.
    fn base_spec(&self, server: &Server, auth: &Auth, client: &str, port_flag: &str) -> ProcessSpec {
        let mut spec = match auth {
            Auth::Key(path) => ProcessSpec::new(client)
                .args(["-o", "BatchMode=yes", "-o", "IdentitiesOnly=yes", "-i"])
                .arg(path.display().to_string()),
            Auth::Password(credential) => ProcessSpec::new(&self.settings.sshpass_binary)
                .args(["-e", client])
                .args([
                    "-o",
                    "PubkeyAuthentication=no",
                    "-o",
                    "PreferredAuthentications=password,keyboard-interactive",
                ])
                .env_secret("SSHPASS", credential.share()),
        };
        spec = spec
            .arg(port_flag)
            .arg(server.port.to_string())
            .args(["-o", self.settings.strict_host_key_checking.as_ssh_option()])
            .arg("-o")
            .arg(format!("UserKnownHostsFile={}", self.known_hosts.display()))
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.settings.connect_timeout_secs))
            .args(["-o", "ServerAliveInterval=15", "-o", "LogLevel=ERROR"]);
        spec
    }

    fn ssh_spec(&self, server: &Server, auth: &Auth, remote: &str) -> ProcessSpec {
        self.base_spec(server, auth, &self.settings.ssh_binary, "-p")
            .arg(server.destination())
            .arg(remote)
    }

    fn agent_spec(&self, server: &Server, auth: &Auth, command: &AgentCommand) -> Result<ProcessSpec, TransportError> {
        let request = command
            .to_request()
            .and_then(|r| r.encode())
            .map_err(|e| TransportError::Protocol {
                host: server.host.clone(),
                reason: e.to_string(),
            })?;
        Ok(self
            .ssh_spec(server, auth, &Self::privileged(server, &self.settings.agent_path))
            .stdin(request))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.settings.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    /// Run `spec`, retrying only while the session fails to come up.
    async fn run_retrying(
        &self,
        server: &Server,
        command: CommandName,
        spec: &ProcessSpec,
        password: bool,
    ) -> Result<Output, TransportError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match self.runner.run(spec).await {
                Ok(output) => match session_failure(server, &output.status, &output.stderr, password) {
                    Some(err) => Err(err),
                    None => Ok(output),
                },
                Err(err) => Err(process_failure(server, command, err)),
            };
            match outcome {
                Err(err) if err.is_connect() && attempt <= self.settings.connect_retries => {
                    tracing::warn!(server = %server.id, attempt, error = %err, "connection failed; retrying");
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                other => return other,
            }
        }
    }

    async fn exchange(
        &self,
        server: &Server,
        auth: &Auth,
        command: &AgentCommand,
        timeout: Duration,
    ) -> Result<AgentResult, TransportError> {
        let spec = self.agent_spec(server, auth, command)?.timeout(timeout);
        let output = self
            .run_retrying(server, command.name(), &spec, auth.is_password())
            .await?;
        parse_result(server, &output.stdout, &output.stderr)
    }
}

impl<R: CommandRunner, C: CredentialSource> AgentTransport for SshTransport<R, C> {
    async fn invoke(
        &self,
        server: &Server,
        command: &AgentCommand,
        timeout: Duration,
    ) -> Result<AgentResult, TransportError> {
        let auth = self.auth_for(server)?;
        self.exchange(server, &auth, command, timeout).await
    }

    async fn invoke_with_password(
        &self,
        server: &Server,
        credential: ScopedCredential,
        command: &AgentCommand,
        timeout: Duration,
    ) -> Result<AgentResult, TransportError> {
        server.ensure_password_login()?;
        let auth = Auth::Password(credential);
        self.exchange(server, &auth, command, timeout).await
    }

    async fn fetch_bundle(
        &self,
        server: &Server,
        name: &ClientName,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        timeout: Duration,
    ) -> Result<BundleFetch, TransportError> {
        let auth = self.auth_for(server)?;
        let command = AgentCommand::FetchBundle(ClientParams { name: name.clone() });
        let spec = self.agent_spec(server, &auth, &command)?.timeout(timeout);

        let mut attempt = 0;
        let streamed = loop {
            attempt += 1;
            let outcome = match self.runner.run_streaming(&spec, sink).await {
                Ok(out) => match session_failure(server, &out.status, &out.stderr, auth.is_password()) {
                    Some(err) if out.bytes_written == 0 => Err(err),
                    Some(err) => Err(TransportError::Channel {
                        host: server.host.clone(),
                        reason: err.to_string(),
                    }),
                    None => Ok(out),
                },
                Err(err) => Err(process_failure(server, CommandName::FetchBundle, err)),
            };
            match outcome {
                Err(err) if err.is_connect() && attempt <= self.settings.connect_retries => {
                    tracing::warn!(server = %server.id, attempt, error = %err, "connection failed; retrying");
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                other => break other?,
            }
        };

        if streamed.status.success() {
            return Ok(BundleFetch::Streamed(streamed.bytes_written));
        }
        last_result_line(&streamed.stderr)
            .map(BundleFetch::Rejected)
            .ok_or_else(|| TransportError::Protocol {
                host: server.host.clone(),
                reason: stderr_summary(&streamed.stderr),
            })
    }
}

impl<R: CommandRunner, C: CredentialSource> AgentInstaller for SshTransport<R, C> {
    async fn install_agent(&self, server: &Server, local: &Path) -> Result<String, TransportError> {
        let auth = self.auth_for(server)?;
        let staging = format!("/tmp/fleetvpn-agent.{}", std::process::id());

        let upload = self
            .base_spec(server, &auth, &self.settings.scp_binary, "-P")
            .arg(local.display().to_string())
            .arg(format!("{}:{staging}", server.destination()));
        let output = self
            .run_retrying(server, CommandName::Install, &upload, auth.is_password())
            .await?;
        if !output.status.success() {
            return Err(TransportError::Channel {
                host: server.host.clone(),
                reason: format!("upload failed: {}", stderr_summary(&output.stderr)),
            });
        }

        let agent = &self.settings.agent_path;
        let remote = format!(
            "{} && rm -f {staging} && sha256sum {agent}",
            Self::privileged(server, &format!("install -m 0755 {staging} {agent}")),
        );
        let install = self.ssh_spec(server, &auth, &remote);
        let output = self
            .run_retrying(server, CommandName::Install, &install, auth.is_password())
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.split_whitespace().next() {
            Some(digest) if output.status.success() => Ok(digest.to_ascii_lowercase()),
            _ => Err(TransportError::Channel {
                host: server.host.clone(),
                reason: format!("install failed: {}", stderr_summary(&output.stderr)),
            }),
        }
    }
}

// ── Classification ────────────────────────────────────────────────────────────

/// A failure of ssh or sshpass themselves, as opposed to the agent's exit.
fn session_failure(
    server: &Server,
    status: &std::process::ExitStatus,
    stderr: &[u8],
    password: bool,
) -> Option<TransportError> {
    let code = status.code()?;
    let text = String::from_utf8_lossy(stderr);
    let host = server.host.clone();
    if password && code == SSHPASS_BAD_PASSWORD {
        return Some(TransportError::Authentication { host });
    }
    if password && code == SSHPASS_HOST_KEY_UNKNOWN {
        return Some(TransportError::Connect {
            host,
            reason: "host key unknown".to_string(),
        });
    }
    if code != SSH_ERROR_EXIT {
        return None;
    }
    if text.contains("Permission denied") {
        return Some(TransportError::Authentication { host });
    }
    let reason = stderr_summary(stderr);
    if CONNECT_FAILURES.iter().any(|p| text.contains(p)) {
        Some(TransportError::Connect { host, reason })
    } else {
        Some(TransportError::Channel { host, reason })
    }
}

fn process_failure(server: &Server, command: CommandName, err: ProcessError) -> TransportError {
    let host = server.host.clone();
    match err {
        ProcessError::TimedOut { after, .. } => TransportError::Timeout { host, command, after },
        ProcessError::Spawn { program, source } => TransportError::Connect {
            host,
            reason: format!("cannot run {program}: {source}"),
        },
        ProcessError::Io { source, .. } => TransportError::Channel {
            host,
            reason: source.to_string(),
        },
    }
}

fn parse_result(server: &Server, stdout: &[u8], stderr: &[u8]) -> Result<AgentResult, TransportError> {
    let text = String::from_utf8_lossy(stdout);
    let body = text.trim();
    if body.is_empty() {
        return Err(TransportError::Protocol {
            host: server.host.clone(),
            reason: format!("agent produced no output: {}", stderr_summary(stderr)),
        });
    }
    serde_json::from_str(body).map_err(|e| TransportError::Protocol {
        host: server.host.clone(),
        reason: e.to_string(),
    })
}

/// The agent reports a refused bundle as one JSON line on stderr, after any
/// log lines.
fn last_result_line(stderr: &[u8]) -> Option<AgentResult> {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str::<AgentResult>(line.trim()).ok())
}

fn stderr_summary(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let last = text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
    if last.is_empty() {
        "no error output".to_string()
    } else {
        last.trim().to_string()
    }
}
