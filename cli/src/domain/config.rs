//! Controller configuration types.
//!
//! Loaded from `~/.fleetvpn/config.yaml` (or `FLEETVPN_CONFIG`); every field
//! has a default so a missing file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Top-level controller configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub ssh: SshSettings,
}

/// How the controller reaches agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub ssh_binary: String,
    pub scp_binary: String,
    pub sshpass_binary: String,
    /// Where the agent binary lives on every host.
    pub agent_path: String,
    /// `yes` refuses unknown host keys; `accept-new` pins them on first use.
    pub strict_host_key_checking: HostKeyPolicy,
    pub connect_timeout_secs: u64,
    /// Extra attempts after a failed connection. Never applied once a
    /// command has been sent.
    pub connect_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            ssh_binary: "ssh".to_string(),
            scp_binary: "scp".to_string(),
            sshpass_binary: "sshpass".to_string(),
            agent_path: "/usr/local/bin/fleetvpn-agent".to_string(),
            strict_host_key_checking: HostKeyPolicy::AcceptNew,
            connect_timeout_secs: 10,
            connect_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    Yes,
    #[default]
    AcceptNew,
}

impl HostKeyPolicy {
    #[must_use]
    pub fn as_ssh_option(self) -> &'static str {
        match self {
            Self::Yes => "StrictHostKeyChecking=yes",
            Self::AcceptNew => "StrictHostKeyChecking=accept-new",
        }
    }
}
