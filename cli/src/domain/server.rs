//! Server records and their lifecycle status.
//!
//! This module is intentionally free of I/O, async, and external layer imports.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use fleetvpn_common::{CLIENT_NAME_RE, KeyType, ServiceState, ValidationError, VpnProtocol};
use serde::{Deserialize, Serialize};

use crate::domain::error::TransportError;

/// Inventory key for a server (`[A-Za-z0-9_-]+`), chosen by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerId(String);

impl ServerId {
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidServerId`] if `id` has characters
    /// outside the identifier pattern.
    pub fn parse(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if CLIENT_NAME_RE.is_match(&id) {
            Ok(Self(id))
        } else {
            Err(ValidationError::InvalidServerId(id))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServerId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ServerId> for String {
    fn from(id: ServerId) -> Self {
        id.0
    }
}

impl FromStr for ServerId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Lifecycle status recorded for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Unconfigured,
    Installed,
    Configured,
    Running,
    Stopped,
    Error,
    Unknown,
}

impl ServerStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Installed => "installed",
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Map the agent's service state. Literals outside the tri-state have no
    /// counterpart and leave the record alone.
    #[must_use]
    pub fn from_service(state: &ServiceState) -> Option<Self> {
        match state {
            ServiceState::Running => Some(Self::Running),
            ServiceState::Stopped => Some(Self::Stopped),
            ServiceState::Error => Some(Self::Error),
            ServiceState::Other(_) => None,
        }
    }

    /// Status after a successful `install`. A server that is already past
    /// installation keeps its status.
    #[must_use]
    pub fn after_install(self) -> Self {
        match self {
            Self::Unconfigured | Self::Error | Self::Unknown => Self::Installed,
            other => other,
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// How the controller authenticates to a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum AuthMethod {
    /// Password supplied per invocation; never stored.
    Password,
    /// Private key file on the controller (mode 0600).
    Key { private_key: PathBuf },
}

/// A managed VPN server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    pub auth: AuthMethod,
    #[serde(default)]
    pub status: ServerStatus,
    /// Port and protocol clients connect to, as last configured.
    #[serde(default = "default_vpn_port")]
    pub vpn_port: u16,
    #[serde(default)]
    pub vpn_protocol: VpnProtocol,
    /// TLS front end configured.
    #[serde(default)]
    pub stunnel_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_type: Option<KeyType>,
    /// Whether the controller may authenticate with a password. Cleared by
    /// `server add --key` and `generate-ssh-key --clear-password`.
    #[serde(default = "default_password_login")]
    pub password_login: bool,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_vpn_port() -> u16 {
    1194
}

fn default_password_login() -> bool {
    true
}

fn default_username() -> String {
    "root".to_string()
}

impl Server {
    #[must_use]
    pub fn new(id: ServerId, host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            username: username.into(),
            auth: AuthMethod::Password,
            status: ServerStatus::Unconfigured,
            vpn_port: default_vpn_port(),
            vpn_protocol: VpnProtocol::default(),
            stunnel_enabled: false,
            ssh_key_type: None,
            password_login: true,
        }
    }

    /// `user@host` as used by ssh.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    #[must_use]
    pub fn private_key(&self) -> Option<&std::path::Path> {
        match &self.auth {
            AuthMethod::Key { private_key } => Some(private_key),
            AuthMethod::Password => None,
        }
    }

    /// # Errors
    ///
    /// Returns [`TransportError::Credential`] once password login has been
    /// switched off for this server.
    pub fn ensure_password_login(&self) -> Result<(), TransportError> {
        if self.password_login {
            Ok(())
        } else {
            Err(TransportError::Credential {
                host: self.host.clone(),
                reason: format!("password login is disabled for {}; use its SSH key", self.id),
            })
        }
    }
}
