//! Application service — move a server from password to key authentication.

use fleetvpn_common::{
    AgentCommand, AuthorizeKeyParams, AuthorizedKey, CommandName, KeyType, ValidationError,
};
use secrecy::SecretString;

use crate::application::ports::{AgentTransport, KeyGenerator, OperationGate};
use crate::application::services::{payload, require_success, transport_failure};
use crate::domain::{OrchestrationError, ScopedCredential, Server};

/// A key pair now trusted by the server.
pub struct InstalledKey {
    pub key_type: KeyType,
    pub public_key: String,
    /// The caller stores this and then switches the server to key auth.
    pub private_key: SecretString,
    /// The key was already listed in `authorized_keys`.
    pub already_present: bool,
}

impl std::fmt::Debug for InstalledKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstalledKey")
            .field("key_type", &self.key_type)
            .field("public_key", &self.public_key)
            .field("already_present", &self.already_present)
            .finish_non_exhaustive()
    }
}

/// Generate a key pair on the controller and authorize its public half on
/// the server, authenticating with `password` for this one call.
///
/// The password is consumed and dropped on every path.
///
/// # Errors
///
/// Returns [`OrchestrationError::Validation`] for an empty password,
/// [`OrchestrationError::KeyGeneration`] if no key can be made, or any
/// dispatch error.
pub async fn generate_ssh_key(
    transport: &impl AgentTransport,
    keygen: &impl KeyGenerator,
    gate: &impl OperationGate,
    server: &Server,
    password: ScopedCredential,
    key_type: KeyType,
) -> Result<InstalledKey, OrchestrationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingField("password").into());
    }
    let _permit = gate.try_shared(&server.id)?;

    let pair = keygen
        .generate(key_type, &format!("fleetvpn@{}", server.id))
        .map_err(|e| OrchestrationError::KeyGeneration(format!("{e:#}")))?;
    let command = AgentCommand::AuthorizeKey(AuthorizeKeyParams {
        public_key: pair.public_key.clone(),
        key_type,
    });
    command.validate()?;

    let result = transport
        .invoke_with_password(server, password, &command, command.max_duration())
        .await
        .map_err(|e| transport_failure(server, CommandName::AuthorizeKey, e))?
        .normalized();
    let result = require_success(server, CommandName::AuthorizeKey, result)?;
    let authorized: AuthorizedKey = payload(server, CommandName::AuthorizeKey, &result)?;

    Ok(InstalledKey {
        key_type,
        public_key: pair.public_key,
        private_key: pair.private_key,
        already_present: authorized.already_present,
    })
}
