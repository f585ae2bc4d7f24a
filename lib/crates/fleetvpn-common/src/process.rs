//! Async process execution shared by the controller and the agent.
//!
//! Programs are always started from an argv vector, never through a shell.
//! `TokioCommandRunner` enforces a timeout on every run and kills the child
//! when it fires.

use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProcessError;

/// Default ceiling for a single local program run.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(300);

// ── Process spec ──────────────────────────────────────────────────────────────

/// An environment value. Secrets stay behind a shared [`SecretString`], so
/// cloning a spec never copies them and they are zeroized with their last
/// owner.
#[derive(Clone)]
enum EnvValue {
    Plain(String),
    Secret(Arc<SecretString>),
}

impl EnvValue {
    fn expose(&self) -> &str {
        match self {
            Self::Plain(value) => value,
            Self::Secret(secret) => secret.expose_secret(),
        }
    }
}

/// A program invocation: argv, environment, working directory and stdin.
#[derive(Clone, Default)]
pub struct ProcessSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, EnvValue)>,
    cwd: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl ProcessSpec {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), EnvValue::Plain(value.into())));
        self
    }

    /// Set a credential in the child's environment without copying it.
    #[must_use]
    pub fn env_secret(mut self, key: impl Into<String>, value: Arc<SecretString>) -> Self {
        self.env.push((key.into(), EnvValue::Secret(value)));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    fn env_value(&self, key: &str) -> Option<&EnvValue> {
        self.env.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// A plain environment value. Secrets are only reachable through
    /// [`ProcessSpec::get_secret_env`].
    #[must_use]
    pub fn get_env(&self, key: &str) -> Option<&str> {
        match self.env_value(key)? {
            EnvValue::Plain(value) => Some(value),
            EnvValue::Secret(_) => None,
        }
    }

    #[must_use]
    pub fn get_secret_env(&self, key: &str) -> Option<&SecretString> {
        match self.env_value(key)? {
            EnvValue::Secret(secret) => Some(secret),
            EnvValue::Plain(_) => None,
        }
    }

    #[must_use]
    pub fn get_cwd(&self) -> Option<&std::path::Path> {
        self.cwd.as_deref()
    }

    #[must_use]
    pub fn get_stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    #[must_use]
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// `program arg1 arg2`, for logs and error messages.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.expose())))
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

// Environment values and stdin may carry credentials.
impl fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field(
                "env",
                &self.env.iter().map(|(k, _)| (k.as_str(), "<redacted>")).collect::<Vec<_>>(),
            )
            .field("cwd", &self.cwd)
            .field("stdin", &self.stdin.as_ref().map(|s| format!("<{} bytes>", s.len())))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Exit status and stderr of a run whose stdout went to a sink.
#[derive(Debug)]
pub struct StreamedOutput {
    pub status: ExitStatus,
    pub stderr: Vec<u8>,
    pub bytes_written: u64,
}

// ── Runner port ───────────────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program to completion and capture its output.
    ///
    /// # Errors
    ///
    /// Returns a [`ProcessError`] if the program cannot be spawned, its pipes
    /// fail, or it exceeds its timeout. On timeout the child is killed.
    async fn run(&self, spec: &ProcessSpec) -> Result<Output, ProcessError>;

    /// Run a program and copy its stdout into `sink` as it arrives.
    ///
    /// # Errors
    ///
    /// Same as [`CommandRunner::run`], plus write failures on `sink`.
    async fn run_streaming(
        &self,
        spec: &ProcessSpec,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<StreamedOutput, ProcessError>;
}

// ── Tokio implementation ──────────────────────────────────────────────────────

/// Production `CommandRunner` on top of `tokio::process`.
///
/// `tokio::time::timeout` around `.output()` drops the future but leaves the
/// OS process running, so the timeout is raced with `tokio::select!` and the
/// child is killed explicitly.
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_TIMEOUT)
    }
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn spawn(&self, spec: &ProcessSpec) -> Result<(tokio::process::Child, Duration), ProcessError> {
        tracing::debug!(command = %spec.command_line(), "spawning process");
        let child = spec.to_command().spawn().map_err(|source| ProcessError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        Ok((child, spec.timeout.unwrap_or(self.timeout)))
    }
}

fn feed_stdin(child: &mut tokio::process::Child, spec: &ProcessSpec) -> tokio::task::JoinHandle<()> {
    let handle = child.stdin.take();
    let input = spec.stdin.clone().unwrap_or_default();
    tokio::spawn(async move {
        if let Some(mut stdin) = handle {
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        }
    })
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<Output, ProcessError> {
        let (mut child, timeout) = self.spawn(spec)?;
        let stdin_task = feed_stdin(&mut child, spec);
        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();
        let program = spec.program.clone();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                let _ = stdin_task.await;
                Ok(Output {
                    status: status.map_err(|source| ProcessError::Io { program: program.clone(), source })?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                tracing::warn!(program = %spec.program, secs = timeout.as_secs(), "process timed out");
                Err(ProcessError::TimedOut { program: spec.program.clone(), after: timeout })
            }
        }
    }

    async fn run_streaming(
        &self,
        spec: &ProcessSpec,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<StreamedOutput, ProcessError> {
        let (mut child, timeout) = self.spawn(spec)?;
        let stdin_task = feed_stdin(&mut child, spec);
        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();
        let program = spec.program.clone();

        tokio::select! {
            result = async {
                let (copied, stderr) = tokio::join!(
                    async {
                        match stdout_handle.as_mut() {
                            Some(h) => tokio::io::copy(h, sink).await,
                            None => Ok(0),
                        }
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                let bytes_written = copied
                    .map_err(|source| ProcessError::Io { program: program.clone(), source })?;
                sink.flush()
                    .await
                    .map_err(|source| ProcessError::Io { program: program.clone(), source })?;
                let status = child
                    .wait()
                    .await
                    .map_err(|source| ProcessError::Io { program: program.clone(), source })?;
                let _ = stdin_task.await;
                Ok(StreamedOutput { status, stderr, bytes_written })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                tracing::warn!(program = %spec.program, secs = timeout.as_secs(), "process timed out");
                Err(ProcessError::TimedOut { program: spec.program.clone(), after: timeout })
            }
        }
    }
}
