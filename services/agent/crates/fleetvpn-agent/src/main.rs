//! fleetvpn agent entry point.
//!
//! Reads one JSON request from stdin, runs it, and writes one JSON result to
//! stdout (or, for `fetch-bundle`, the raw bundle bytes). Diagnostics go to
//! stderr so stdout stays machine-readable. Configuration comes from
//! `FLEETVPN_AGENT_*` environment variables.

mod authorized_keys;
mod error;
mod executor;
mod lifecycle;
mod management;
mod pki;
mod stunnel;
mod templates;
#[cfg(test)]
mod test_support;

use std::process::ExitCode;

use anyhow::{Context, Result};
use fleetvpn_common::{
    AgentCommand, AgentConfig, AgentErrorCode, AgentRequest, AgentResult, CommandRunner,
    ProtocolError, TokioCommandRunner,
};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

use crate::executor::Executor;

// ===================================================================
// Request handling
// ===================================================================

fn rejected_request(err: &ProtocolError) -> AgentResult {
    let code = match err {
        ProtocolError::UnknownCommand(_) => AgentErrorCode::UnknownCommand,
        _ => AgentErrorCode::InvalidParams,
    };
    AgentResult::failed("Request rejected", err.to_string()).with_code(code)
}

async fn write_json<W: AsyncWrite + Unpin>(out: &mut W, result: &AgentResult) -> Result<()> {
    let mut line = serde_json::to_vec(result).context("failed to serialize result")?;
    line.push(b'\n');
    out.write_all(&line).await.context("failed to write result")?;
    out.flush().await.context("failed to flush output")
}

/// Handle one request. Returns whether it succeeded.
///
/// Nothing privileged runs unless the command name and its parameters
/// validate first.
async fn serve<R, O, E>(executor: &Executor<R>, input: &[u8], stdout: &mut O, stderr: &mut E) -> Result<bool>
where
    R: CommandRunner,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let command = match AgentRequest::decode(input).and_then(AgentCommand::from_request) {
        Ok(command) => command,
        Err(err) => {
            tracing::warn!(error = %err, "rejecting request");
            write_json(stdout, &rejected_request(&err)).await?;
            return Ok(false);
        }
    };

    if let AgentCommand::FetchBundle(params) = &command {
        return match executor.fetch_bundle(&params.name, stdout).await {
            Ok(bytes) => {
                tracing::info!(client = %params.name, bytes, "bundle streamed");
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(client = %params.name, error = %err, "bundle unavailable");
                write_json(stderr, &err.into_result("fetch-bundle failed")).await?;
                Ok(false)
            }
        };
    }

    let result = executor.execute(&command).await;
    write_json(stdout, &result).await?;
    Ok(result.success)
}

async fn run() -> Result<bool> {
    let config: AgentConfig = envy::prefixed("FLEETVPN_AGENT_")
        .from_env()
        .context("failed to load configuration from FLEETVPN_AGENT_* environment variables")?;
    tracing::debug!(?config, "configuration loaded");

    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("failed to read request from stdin")?;

    let executor = Executor::new(config, TokioCommandRunner::default());
    serve(&executor, &input, &mut tokio::io::stdout(), &mut tokio::io::stderr()).await
}

// ===================================================================
// Entry point
// ===================================================================

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "agent failed");
            let result = AgentResult::failed("Agent error", format!("{err:#}"))
                .with_code(AgentErrorCode::Internal);
            // Best effort: the caller still gets a JSON envelope if stdout works.
            let _ = write_json(&mut tokio::io::stdout(), &result).await;
            ExitCode::FAILURE
        }
    }
}
