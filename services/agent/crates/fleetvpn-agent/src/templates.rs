//! Rendering of the files the agent writes: `server.conf`, client bundles,
//! easy-rsa `vars` and the stunnel configuration. Pure functions only.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::Path;

use fleetvpn_common::{CaSubject, CreateClientParams, StunnelParams, VpnProtocol, VpnSettings};

pub const CIPHER: &str = "AES-256-GCM";
pub const AUTH_DIGEST: &str = "SHA256";

/// Render `server.conf` for the given settings.
pub fn server_conf(settings: &VpnSettings, management: SocketAddr, log_dir: &Path) -> String {
    let mut conf = String::new();
    let log_dir = log_dir.display();
    // Writing to a String cannot fail.
    let _ = writeln!(conf, "port {}", settings.port);
    let _ = writeln!(conf, "proto {}", settings.protocol);
    conf.push_str("dev tun\n");
    conf.push_str("ca ca.crt\ncert server.crt\nkey server.key\ndh dh.pem\n");
    conf.push_str("crl-verify crl.pem\n");
    let _ = writeln!(conf, "server {} {}", settings.subnet, settings.netmask);
    let _ = writeln!(conf, "ifconfig-pool-persist {log_dir}/ipp.txt");
    conf.push_str("push \"redirect-gateway def1 bypass-dhcp\"\n");
    for dns in &settings.dns_servers {
        let _ = writeln!(conf, "push \"dhcp-option DNS {dns}\"");
    }
    conf.push_str("keepalive 10 120\n");
    conf.push_str("tls-crypt ta.key\n");
    let _ = writeln!(conf, "cipher {CIPHER}");
    let _ = writeln!(conf, "auth {AUTH_DIGEST}");
    let _ = writeln!(conf, "management {} {}", management.ip(), management.port());
    conf.push_str("user nobody\ngroup nogroup\n");
    conf.push_str("persist-key\npersist-tun\n");
    let _ = writeln!(conf, "status {log_dir}/openvpn-status.log");
    let _ = writeln!(conf, "log-append {log_dir}/openvpn.log");
    conf.push_str("verb 3\n");
    if settings.protocol == VpnProtocol::Udp {
        conf.push_str("explicit-exit-notify 1\n");
    }
    conf
}

/// Key material inlined into a client bundle.
pub struct BundleMaterial<'a> {
    pub ca: &'a str,
    pub cert: &'a str,
    pub key: &'a str,
    pub tls_crypt: Option<&'a str>,
}

/// Render a self-contained `.ovpn` client bundle.
pub fn client_bundle(params: &CreateClientParams, material: &BundleMaterial<'_>) -> String {
    let mut out = String::new();
    out.push_str("client\ndev tun\n");
    let _ = writeln!(out, "proto {}", params.protocol);
    let _ = writeln!(out, "remote {} {}", params.server_host, params.port);
    out.push_str("resolv-retry infinite\nnobind\npersist-key\npersist-tun\n");
    out.push_str("remote-cert-tls server\n");
    let _ = writeln!(out, "cipher {CIPHER}");
    let _ = writeln!(out, "auth {AUTH_DIGEST}");
    out.push_str("verb 3\n");
    push_inline(&mut out, "ca", material.ca);
    push_inline(&mut out, "cert", material.cert);
    push_inline(&mut out, "key", material.key);
    if let Some(ta) = material.tls_crypt {
        push_inline(&mut out, "tls-crypt", ta);
    }
    out
}

fn push_inline(out: &mut String, tag: &str, body: &str) {
    let _ = writeln!(out, "<{tag}>");
    out.push_str(body.trim_end());
    let _ = writeln!(out, "\n</{tag}>");
}

/// Keep only the PEM block(s) of a file. easy-rsa prefixes issued
/// certificates with a text dump that clients do not need.
pub fn pem_blocks(text: &str) -> &str {
    match text.find("-----BEGIN") {
        Some(start) => text[start..].trim_end(),
        None => text.trim_end(),
    }
}

/// easy-rsa `vars`: EC keys, SHA-512 digests and the CA subject.
pub fn easy_rsa_vars(subject: &CaSubject) -> String {
    let mut vars = String::new();
    vars.push_str("set_var EASYRSA_ALGO \"ec\"\n");
    vars.push_str("set_var EASYRSA_DIGEST \"sha512\"\n");
    vars.push_str("set_var EASYRSA_DN \"org\"\n");
    for (key, value) in [
        ("EASYRSA_REQ_COUNTRY", &subject.country),
        ("EASYRSA_REQ_PROVINCE", &subject.province),
        ("EASYRSA_REQ_CITY", &subject.city),
        ("EASYRSA_REQ_ORG", &subject.organization),
        ("EASYRSA_REQ_EMAIL", &subject.email),
    ] {
        let _ = writeln!(vars, "set_var {key} \"{}\"", sanitize_var(value));
    }
    vars
}

// `vars` is sourced by a shell, so quotes and expansions are dropped.
fn sanitize_var(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '"' | '$' | '`' | '\\' | '\n' | '\r'))
        .collect()
}

/// Render `stunnel.conf` accepting TLS on `stunnel_port` and forwarding to
/// the local VPN port.
pub fn stunnel_conf(params: &StunnelParams, cert_path: &Path) -> String {
    let mut conf = String::new();
    conf.push_str("setuid = stunnel4\nsetgid = stunnel4\n");
    conf.push_str("pid = /var/run/stunnel4/stunnel.pid\n");
    let _ = writeln!(conf, "cert = {}", cert_path.display());
    conf.push_str("client = no\n\n[openvpn]\n");
    let _ = writeln!(conf, "accept = 0.0.0.0:{}", params.stunnel_port);
    let _ = writeln!(conf, "connect = 127.0.0.1:{}", params.openvpn_port);
    conf
}

/// The port an existing `stunnel.conf` accepts on. `accept` may be a bare
/// port or `host:port`.
pub fn stunnel_accept_port(conf: &str) -> Option<u16> {
    conf.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        if key.trim() != "accept" {
            return None;
        }
        let value = value.trim();
        let port = value.rsplit_once(':').map_or(value, |(_, port)| port);
        port.parse().ok()
    })
}
