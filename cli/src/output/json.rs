//! JSON output helpers.
//!
//! Every `--json` response is one pretty-printed object on stdout. Failures
//! use the error object from [`format_error`].

use anyhow::{Context, Result};
use fleetvpn_common::ValidationError;
use serde::Serialize;

use crate::domain::{InventoryError, OrchestrationError};

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    format_failure(&Failure {
        message,
        code,
        steps: None,
        output: None,
    })
}

/// A failure with whatever detail the agent sent back.
#[derive(Debug, Serialize)]
pub struct Failure<'a> {
    pub message: &'a str,
    pub code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<&'a str>,
}

/// Format a JSON error object carrying completed steps and agent output.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_failure(failure: &Failure<'_>) -> Result<String> {
    let mut obj = serde_json::to_value(failure).context("JSON serialization failed")?;
    if let Some(map) = obj.as_object_mut() {
        map.insert("error".to_string(), serde_json::Value::Bool(true));
    }
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Machine-readable code for an error that reached the top level.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(e) = err.downcast_ref::<OrchestrationError>() {
        return e.kind();
    }
    if err.downcast_ref::<ValidationError>().is_some() {
        return "validation";
    }
    match err.downcast_ref::<InventoryError>() {
        Some(InventoryError::ServerExists(_)) => "conflict",
        Some(InventoryError::ServerNotFound(_) | InventoryError::ClientNotFound { .. }) => {
            "not-found"
        }
        None => "error",
    }
}

/// Format a top-level error, carrying completed steps and the agent's
/// output when the failure came from an orchestration service.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_anyhow(err: &anyhow::Error) -> Result<String> {
    let orchestration = err.downcast_ref::<OrchestrationError>();
    let steps: Option<Vec<String>> = orchestration.and_then(|e| match e {
        OrchestrationError::PartialFailure { completed, .. } => Some(completed.clone()),
        OrchestrationError::StepFailed { completed, .. } => {
            Some(completed.iter().map(ToString::to_string).collect())
        }
        _ => None,
    });
    let output = orchestration
        .and_then(OrchestrationError::agent_result)
        .map(|r| r.output.as_str())
        .filter(|o| !o.is_empty());
    let message = format!("{err:#}");
    format_failure(&Failure {
        message: &message,
        code: error_code(err),
        steps: steps.as_deref(),
        output,
    })
}

/// Writes responses as JSON to stdout.
pub struct JsonRenderer;

impl JsonRenderer {
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn emit<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("JSON serialization failed")?
        );
        Ok(())
    }
}
