//! The command protocol between the controller and the agent.
//!
//! A request is one JSON object `{ "command": <name>, "params": { ... } }`
//! written to the agent's stdin. The set of names is closed: [`CommandName`]
//! is the whitelist, and a request naming anything else fails to decode
//! before the agent touches the host.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ValidationError};
use crate::types::{ClientName, KeyType, VpnProtocol, VpnSettings, validate_email};

static HOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z0-9.:-]{1,253}$").expect("valid regex")
});

static PUBLIC_KEY_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z0-9+/]+={0,3}$").expect("valid regex")
});

// ── Command names ─────────────────────────────────────────────────────────────

/// Every operation the agent accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandName {
    Install,
    Configure,
    Reinstall,
    ListClients,
    CreateClient,
    RevokeClient,
    GetStatus,
    DisconnectClient,
    ServiceStart,
    ServiceStop,
    ServiceRestart,
    StunnelSetup,
    StunnelStart,
    StunnelStop,
    StunnelRestart,
    AuthorizeKey,
    FetchBundle,
}

impl CommandName {
    pub const ALL: [Self; 17] = [
        Self::Install,
        Self::Configure,
        Self::Reinstall,
        Self::ListClients,
        Self::CreateClient,
        Self::RevokeClient,
        Self::GetStatus,
        Self::DisconnectClient,
        Self::ServiceStart,
        Self::ServiceStop,
        Self::ServiceRestart,
        Self::StunnelSetup,
        Self::StunnelStart,
        Self::StunnelStop,
        Self::StunnelRestart,
        Self::AuthorizeKey,
        Self::FetchBundle,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Configure => "configure",
            Self::Reinstall => "reinstall",
            Self::ListClients => "list-clients",
            Self::CreateClient => "create-client",
            Self::RevokeClient => "revoke-client",
            Self::GetStatus => "get-status",
            Self::DisconnectClient => "disconnect-client",
            Self::ServiceStart => "service-start",
            Self::ServiceStop => "service-stop",
            Self::ServiceRestart => "service-restart",
            Self::StunnelSetup => "stunnel-setup",
            Self::StunnelStart => "stunnel-start",
            Self::StunnelStop => "stunnel-stop",
            Self::StunnelRestart => "stunnel-restart",
            Self::AuthorizeKey => "authorize-key",
            Self::FetchBundle => "fetch-bundle",
        }
    }

    /// Ceiling on how long the controller waits for this command.
    #[must_use]
    pub fn max_duration(self) -> Duration {
        let secs = match self {
            Self::Install | Self::StunnelSetup => 600,
            Self::Configure => 1800,
            Self::Reinstall => 3600,
            Self::ListClients | Self::FetchBundle => 60,
            Self::CreateClient
            | Self::RevokeClient
            | Self::ServiceStart
            | Self::ServiceStop
            | Self::ServiceRestart
            | Self::StunnelStart
            | Self::StunnelStop
            | Self::StunnelRestart => 120,
            Self::GetStatus | Self::DisconnectClient | Self::AuthorizeKey => 30,
        };
        Duration::from_secs(secs)
    }

    /// Whether the command changes the VPN service's lifecycle state.
    #[must_use]
    pub fn is_lifecycle(self) -> bool {
        matches!(
            self,
            Self::Install
                | Self::Configure
                | Self::Reinstall
                | Self::ServiceStart
                | Self::ServiceStop
                | Self::ServiceRestart
        )
    }

    /// Whether the agent answers with raw bytes instead of a JSON result.
    #[must_use]
    pub fn streams_raw(self) -> bool {
        matches!(self, Self::FetchBundle)
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownCommand(s.to_string()))
    }
}

// ── Parameters ────────────────────────────────────────────────────────────────

/// `configure`: render the server from these settings. An existing CA is
/// only replaced when `force` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureParams {
    #[serde(flatten)]
    pub settings: VpnSettings,
    #[serde(default)]
    pub force: bool,
}

/// Parameters for commands addressing a single client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientParams {
    pub name: ClientName,
}

/// `create-client`: the endpoint clients should dial is written into the
/// bundle, so the controller supplies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClientParams {
    pub name: ClientName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub server_host: String,
    #[serde(default = "default_vpn_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: VpnProtocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StunnelParams {
    #[serde(default = "default_stunnel_port")]
    pub stunnel_port: u16,
    #[serde(default = "default_vpn_port")]
    pub openvpn_port: u16,
    pub server_ip: String,
}

/// `authorize-key`: one OpenSSH public key line to add to `authorized_keys`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeKeyParams {
    pub public_key: String,
    pub key_type: KeyType,
}

fn default_vpn_port() -> u16 {
    1194
}

fn default_stunnel_port() -> u16 {
    443
}

/// A hostname or IP literal as accepted on the wire.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidHost`] for anything else.
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    if host.is_empty() {
        return Err(ValidationError::MissingField("server_host"));
    }
    if HOST_RE.is_match(host) {
        Ok(())
    } else {
        Err(ValidationError::InvalidHost(host.to_string()))
    }
}

impl CreateClientParams {
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a bad email, host or port.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            validate_email(email)?;
        }
        validate_host(&self.server_host)?;
        if self.port == 0 {
            return Err(ValidationError::InvalidPort(self.port));
        }
        Ok(())
    }
}

impl StunnelParams {
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a bad address or port.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stunnel_port == 0 {
            return Err(ValidationError::InvalidPort(self.stunnel_port));
        }
        if self.openvpn_port == 0 {
            return Err(ValidationError::InvalidPort(self.openvpn_port));
        }
        validate_host(&self.server_ip)
    }
}

impl AuthorizeKeyParams {
    /// Checks the key is a single `<algorithm> <base64> [comment]` line whose
    /// algorithm matches `key_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPublicKey`] otherwise.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let key = self.public_key.trim();
        if key.contains(['\n', '\r']) {
            return Err(ValidationError::InvalidPublicKey(
                "key must be a single line".to_string(),
            ));
        }
        let mut parts = key.split_whitespace();
        let algorithm = parts.next().unwrap_or_default();
        if algorithm != self.key_type.openssh_prefix() {
            return Err(ValidationError::InvalidPublicKey(format!(
                "expected {} key, found '{algorithm}'",
                self.key_type.openssh_prefix()
            )));
        }
        match parts.next() {
            Some(body) if PUBLIC_KEY_BODY_RE.is_match(body) => Ok(()),
            _ => Err(ValidationError::InvalidPublicKey(
                "missing or malformed key body".to_string(),
            )),
        }
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// The wire form of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub command: CommandName,
    #[serde(default)]
    pub params: Value,
}

#[derive(Deserialize)]
struct RawRequest {
    command: String,
    #[serde(default)]
    params: Value,
}

impl AgentRequest {
    /// Decode a request, naming the offending command when it is not in the
    /// whitelist.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownCommand`] for a name outside
    /// [`CommandName`] and [`ProtocolError::Malformed`] for invalid JSON.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let raw: RawRequest = serde_json::from_slice(bytes)?;
        let command = raw.command.parse()?;
        Ok(Self {
            command,
            params: raw.params,
        })
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }
}

// ── Typed commands ────────────────────────────────────────────────────────────

/// A whitelisted command together with its typed parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    Install,
    Configure(ConfigureParams),
    Reinstall(VpnSettings),
    ListClients,
    CreateClient(CreateClientParams),
    RevokeClient(ClientParams),
    GetStatus,
    DisconnectClient(ClientParams),
    ServiceStart,
    ServiceStop,
    ServiceRestart,
    StunnelSetup(StunnelParams),
    StunnelStart,
    StunnelStop,
    StunnelRestart,
    AuthorizeKey(AuthorizeKeyParams),
    FetchBundle(ClientParams),
}

impl AgentCommand {
    #[must_use]
    pub fn name(&self) -> CommandName {
        match self {
            Self::Install => CommandName::Install,
            Self::Configure(_) => CommandName::Configure,
            Self::Reinstall(_) => CommandName::Reinstall,
            Self::ListClients => CommandName::ListClients,
            Self::CreateClient(_) => CommandName::CreateClient,
            Self::RevokeClient(_) => CommandName::RevokeClient,
            Self::GetStatus => CommandName::GetStatus,
            Self::DisconnectClient(_) => CommandName::DisconnectClient,
            Self::ServiceStart => CommandName::ServiceStart,
            Self::ServiceStop => CommandName::ServiceStop,
            Self::ServiceRestart => CommandName::ServiceRestart,
            Self::StunnelSetup(_) => CommandName::StunnelSetup,
            Self::StunnelStart => CommandName::StunnelStart,
            Self::StunnelStop => CommandName::StunnelStop,
            Self::StunnelRestart => CommandName::StunnelRestart,
            Self::AuthorizeKey(_) => CommandName::AuthorizeKey,
            Self::FetchBundle(_) => CommandName::FetchBundle,
        }
    }

    #[must_use]
    pub fn max_duration(&self) -> Duration {
        self.name().max_duration()
    }

    /// Validate parameters without touching anything.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Configure(p) => p.settings.validate(),
            Self::Reinstall(settings) => settings.validate(),
            Self::CreateClient(p) => p.validate(),
            Self::StunnelSetup(p) => p.validate(),
            Self::AuthorizeKey(p) => p.validate(),
            _ => Ok(()),
        }
    }

    /// Build the wire request.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters cannot be serialized.
    pub fn to_request(&self) -> Result<AgentRequest, ProtocolError> {
        let params = match self {
            Self::Configure(p) => serde_json::to_value(p)?,
            Self::Reinstall(p) => serde_json::to_value(p)?,
            Self::CreateClient(p) => serde_json::to_value(p)?,
            Self::RevokeClient(p) | Self::DisconnectClient(p) | Self::FetchBundle(p) => {
                serde_json::to_value(p)?
            }
            Self::StunnelSetup(p) => serde_json::to_value(p)?,
            Self::AuthorizeKey(p) => serde_json::to_value(p)?,
            _ => Value::Object(serde_json::Map::new()),
        };
        Ok(AgentRequest {
            command: self.name(),
            params,
        })
    }

    /// Parse and validate the parameters of a decoded request.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidParams`] when the parameters do not
    /// match the command's schema or fail validation.
    pub fn from_request(request: AgentRequest) -> Result<Self, ProtocolError> {
        let name = request.command;
        let params = match request.params {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };
        let command = match name {
            CommandName::Install => Self::Install,
            CommandName::Configure => Self::Configure(parse_params(name, params)?),
            CommandName::Reinstall => Self::Reinstall(parse_params(name, params)?),
            CommandName::ListClients => Self::ListClients,
            CommandName::CreateClient => Self::CreateClient(parse_params(name, params)?),
            CommandName::RevokeClient => Self::RevokeClient(parse_params(name, params)?),
            CommandName::GetStatus => Self::GetStatus,
            CommandName::DisconnectClient => Self::DisconnectClient(parse_params(name, params)?),
            CommandName::ServiceStart => Self::ServiceStart,
            CommandName::ServiceStop => Self::ServiceStop,
            CommandName::ServiceRestart => Self::ServiceRestart,
            CommandName::StunnelSetup => Self::StunnelSetup(parse_params(name, params)?),
            CommandName::StunnelStart => Self::StunnelStart,
            CommandName::StunnelStop => Self::StunnelStop,
            CommandName::StunnelRestart => Self::StunnelRestart,
            CommandName::AuthorizeKey => Self::AuthorizeKey(parse_params(name, params)?),
            CommandName::FetchBundle => Self::FetchBundle(parse_params(name, params)?),
        };
        command
            .validate()
            .map_err(|e| ProtocolError::InvalidParams {
                command: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(command)
    }
}

fn parse_params<T: DeserializeOwned>(name: CommandName, params: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams {
        command: name.to_string(),
        reason: e.to_string(),
    })
}
