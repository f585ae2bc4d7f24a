use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Agent configuration, read from `FLEETVPN_AGENT_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// easy-rsa working directory holding `pki/` (default: /etc/openvpn/easy-rsa)
    #[serde(default = "default_easy_rsa_dir")]
    pub easy_rsa_dir: PathBuf,

    /// easy-rsa distribution copied into `easy_rsa_dir` (default: /usr/share/easy-rsa)
    #[serde(default = "default_easy_rsa_source")]
    pub easy_rsa_source: PathBuf,

    /// OpenVPN configuration directory (default: /etc/openvpn)
    #[serde(default = "default_openvpn_dir")]
    pub openvpn_dir: PathBuf,

    /// Where generated `.ovpn` bundles are kept (default: /root/client-configs)
    #[serde(default = "default_client_configs_dir")]
    pub client_configs_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// systemd unit of the VPN daemon (default: openvpn@server)
    #[serde(default = "default_service_unit")]
    pub service_unit: String,

    /// OpenVPN management interface (default: 127.0.0.1:7505)
    #[serde(default = "default_management_addr")]
    pub management_addr: SocketAddr,

    #[serde(default = "default_stunnel_dir")]
    pub stunnel_dir: PathBuf,

    /// `/etc/default/stunnel4`, where `ENABLED=1` is set
    #[serde(default = "default_stunnel_defaults")]
    pub stunnel_defaults: PathBuf,

    #[serde(default = "default_stunnel_unit")]
    pub stunnel_unit: String,

    /// `authorized_keys` to manage. Unset means the file of the account that
    /// invoked the agent through sudo.
    #[serde(default)]
    pub authorized_keys: Option<PathBuf>,

    /// Drop-in that persists `net.ipv4.ip_forward=1`
    #[serde(default = "default_sysctl_conf")]
    pub sysctl_conf: PathBuf,

    /// Seconds allowed for package installation steps
    #[serde(default = "default_package_timeout_secs")]
    pub package_timeout_secs: u64,
}

fn default_easy_rsa_dir() -> PathBuf {
    PathBuf::from("/etc/openvpn/easy-rsa")
}

fn default_easy_rsa_source() -> PathBuf {
    PathBuf::from("/usr/share/easy-rsa")
}

fn default_openvpn_dir() -> PathBuf {
    PathBuf::from("/etc/openvpn")
}

fn default_client_configs_dir() -> PathBuf {
    PathBuf::from("/root/client-configs")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/openvpn")
}

fn default_service_unit() -> String {
    "openvpn@server".to_string()
}

fn default_management_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7505))
}

fn default_stunnel_dir() -> PathBuf {
    PathBuf::from("/etc/stunnel")
}

fn default_stunnel_defaults() -> PathBuf {
    PathBuf::from("/etc/default/stunnel4")
}

fn default_stunnel_unit() -> String {
    "stunnel4".to_string()
}

fn default_sysctl_conf() -> PathBuf {
    PathBuf::from("/etc/sysctl.d/99-fleetvpn.conf")
}

fn default_package_timeout_secs() -> u64 {
    540
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            easy_rsa_dir: default_easy_rsa_dir(),
            easy_rsa_source: default_easy_rsa_source(),
            openvpn_dir: default_openvpn_dir(),
            client_configs_dir: default_client_configs_dir(),
            log_dir: default_log_dir(),
            service_unit: default_service_unit(),
            management_addr: default_management_addr(),
            stunnel_dir: default_stunnel_dir(),
            stunnel_defaults: default_stunnel_defaults(),
            stunnel_unit: default_stunnel_unit(),
            authorized_keys: None,
            sysctl_conf: default_sysctl_conf(),
            package_timeout_secs: default_package_timeout_secs(),
        }
    }
}

impl AgentConfig {
    #[must_use]
    pub fn pki_dir(&self) -> PathBuf {
        self.easy_rsa_dir.join("pki")
    }

    #[must_use]
    pub fn bundle_path(&self, file_name: &str) -> PathBuf {
        self.client_configs_dir.join(file_name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_management_addr_is_loopback() {
        let cfg = AgentConfig::default();
        assert!(cfg.management_addr.ip().is_loopback());
        assert_eq!(cfg.management_addr.port(), 7505);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: AgentConfig = serde_json::from_str(r#"{"service_unit": "openvpn-server@main"}"#).unwrap();
        assert_eq!(cfg.service_unit, "openvpn-server@main");
        assert_eq!(cfg.easy_rsa_dir, PathBuf::from("/etc/openvpn/easy-rsa"));
        assert_eq!(cfg.pki_dir(), PathBuf::from("/etc/openvpn/easy-rsa/pki"));
    }
}
