//! Failures inside a command handler.
//!
//! Handlers return `Result<AgentResult, ExecError>`; the dispatcher turns an
//! `ExecError` into a `success=false` result so nothing escapes as a crash.

use fleetvpn_common::{AgentErrorCode, AgentResult, ProcessError, ProtocolError};
use thiserror::Error;

use crate::management::ManagementError;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Management(#[from] ManagementError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("`{command}` exited with {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// A precondition the host does not meet; carries its wire code.
    #[error("{message}")]
    Rejected {
        code: AgentErrorCode,
        message: String,
    },
}

impl ExecError {
    pub fn rejected(code: AgentErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> AgentErrorCode {
        match self {
            Self::Rejected { code, .. } => *code,
            _ => AgentErrorCode::Internal,
        }
    }

    /// Render as a failed result headed by `message`.
    #[must_use]
    pub fn into_result(self, message: impl Into<String>) -> AgentResult {
        let code = self.code();
        AgentResult::failed(message, self.to_string()).with_code(code)
    }
}

/// Attach a description to an I/O error.
pub trait IoContext<T> {
    /// # Errors
    ///
    /// Wraps the original error in [`ExecError::Io`].
    fn io_context<F: FnOnce() -> String>(self, context: F) -> Result<T, ExecError>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F: FnOnce() -> String>(self, context: F) -> Result<T, ExecError> {
        self.map_err(|source| ExecError::Io {
            context: context(),
            source,
        })
    }
}
