//! Value types shared by the controller and the agent.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Client identifiers end up in easy-rsa arguments and file names, so the
/// pattern is enforced wherever a name enters the system.
pub static CLIENT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("valid regex")
});

/// Reserved for the server certificate inside the CA.
pub const SERVER_CERT_NAME: &str = "server";

// ── Client name ───────────────────────────────────────────────────────────────

/// A validated client identifier (`[A-Za-z0-9_-]+`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientName(String);

impl ClientName {
    /// Validate and wrap a client name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidClientName`] if the name is empty or
    /// contains anything outside `[A-Za-z0-9_-]`.
    pub fn parse(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if CLIENT_NAME_RE.is_match(&name) {
            Ok(Self(name))
        } else {
            Err(ValidationError::InvalidClientName(name))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the client bundle on the remote host.
    #[must_use]
    pub fn bundle_file_name(&self) -> String {
        format!("{}.ovpn", self.0)
    }
}

impl TryFrom<String> for ClientName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ClientName> for String {
    fn from(name: ClientName) -> Self {
        name.0
    }
}

impl FromStr for ClientName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate an optional client email address.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidEmail`] if the address is not
/// `local@domain.tld` shaped.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.len() <= 254 && EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

// ── Enumerations ──────────────────────────────────────────────────────────────

/// SSH key algorithm used when provisioning key-based access to a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    Ed25519,
    Rsa,
}

impl KeyType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ed25519 => "ed25519",
            Self::Rsa => "rsa",
        }
    }

    /// Algorithm prefix of an OpenSSH public key line for this key type.
    #[must_use]
    pub fn openssh_prefix(self) -> &'static str {
        match self {
            Self::Ed25519 => "ssh-ed25519",
            Self::Rsa => "ssh-rsa",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ed25519" => Ok(Self::Ed25519),
            "rsa" => Ok(Self::Rsa),
            other => Err(ValidationError::UnsupportedKeyType(other.to_string())),
        }
    }
}

/// Transport protocol the VPN daemon listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum VpnProtocol {
    #[default]
    Udp,
    Tcp,
}

impl VpnProtocol {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }
}

impl fmt::Display for VpnProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certificate status as recorded by the remote CA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Active,
    Revoked,
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        })
    }
}

/// Run state of a remote service.
///
/// `running`, `stopped` and `error` are the known literals; anything else the
/// agent reports is kept verbatim in [`ServiceState::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServiceState {
    Running,
    Stopped,
    Error,
    Other(String),
}

impl ServiceState {
    /// Map a `systemctl is-active` answer onto a service state.
    #[must_use]
    pub fn from_systemd(active_state: &str) -> Self {
        match active_state.trim() {
            "active" => Self::Running,
            "inactive" | "deactivating" => Self::Stopped,
            "failed" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Other(s) => s,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl From<String> for ServiceState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            "error" => Self::Error,
            _ => Self::Other(value),
        }
    }
}

impl From<ServiceState> for String {
    fn from(state: ServiceState) -> Self {
        match state {
            ServiceState::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── VPN settings ──────────────────────────────────────────────────────────────

/// Subject fields for the CA certificate (`EASYRSA_REQ_*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaSubject {
    pub country: String,
    pub province: String,
    pub city: String,
    pub organization: String,
    pub email: String,
    pub common_name: String,
}

impl Default for CaSubject {
    fn default() -> Self {
        Self {
            country: "RU".to_string(),
            province: "Moscow".to_string(),
            city: "Moscow".to_string(),
            organization: "OpenVPN".to_string(),
            email: "admin@example.com".to_string(),
            common_name: "OpenVPN-CA".to_string(),
        }
    }
}

/// Server-side VPN parameters rendered into `server.conf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VpnSettings {
    pub port: u16,
    pub protocol: VpnProtocol,
    pub subnet: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub dns_servers: Vec<Ipv4Addr>,
    pub ca_subject: CaSubject,
}

impl Default for VpnSettings {
    fn default() -> Self {
        Self {
            port: 1194,
            protocol: VpnProtocol::Udp,
            subnet: Ipv4Addr::new(10, 8, 0, 0),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            dns_servers: vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(8, 8, 4, 4)],
            ca_subject: CaSubject::default(),
        }
    }
}

impl VpnSettings {
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a zero port or an empty DNS list.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort(self.port));
        }
        if self.dns_servers.is_empty() {
            return Err(ValidationError::MissingField("dns_servers"));
        }
        if !self.ca_subject.email.is_empty() {
            validate_email(&self.ca_subject.email)?;
        }
        Ok(())
    }
}

// ── Client listing ────────────────────────────────────────────────────────────

/// One certificate known to the remote CA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    pub name: ClientName,
    pub status: CertificateStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}
