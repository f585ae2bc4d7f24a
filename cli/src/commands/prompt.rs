//! Terminal prompts: SSH passwords and destructive-operation confirmation.

use secrecy::SecretString;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::ports::CredentialSource;
use crate::domain::{ScopedCredential, Server, TransportError};

/// Environment variable consulted before prompting.
pub const PASSWORD_ENV: &str = "FLEETVPN_SSH_PASSWORD";

/// Reads `FLEETVPN_SSH_PASSWORD`, else prompts on the terminal when allowed.
#[derive(Debug, Clone, Copy)]
pub struct PromptCredentials {
    interactive: bool,
}

impl PromptCredentials {
    #[must_use]
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }
}

impl CredentialSource for PromptCredentials {
    fn password_for(&self, server: &Server) -> Result<ScopedCredential, TransportError> {
        server.ensure_password_login()?;
        if let Some(password) = std::env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty()) {
            return Ok(ScopedCredential::password(SecretString::new(password)));
        }
        if !self.interactive {
            return Err(TransportError::Credential {
                host: server.host.clone(),
                reason: format!("no password; set {PASSWORD_ENV} or run interactively"),
            });
        }
        dialoguer::Password::new()
            .with_prompt(format!("SSH password for {}", server.destination()))
            .interact()
            .map(|p| ScopedCredential::password(SecretString::new(p)))
            .map_err(|e| TransportError::Credential {
                host: server.host.clone(),
                reason: e.to_string(),
            })
    }
}

/// Ask the operator to type the server id before a destructive operation.
///
/// Never prompts when non-interactive; the operator must pass `--confirm`.
///
/// # Errors
///
/// Returns an error if the terminal prompt fails.
pub fn confirm_destructive(app: &AppContext, server: &Server, action: &str) -> Result<bool> {
    if app.non_interactive || app.is_json() {
        return Ok(false);
    }
    app.output.warn(&format!(
        "{action} wipes the VPN configuration and every client certificate on {}",
        server.destination()
    ));
    let typed: String = dialoguer::Input::new()
        .with_prompt(format!("Type '{}' to continue", server.id))
        .allow_empty(true)
        .interact_text()?;
    Ok(typed.trim() == server.id.as_str())
}
