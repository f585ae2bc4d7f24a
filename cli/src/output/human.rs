//! Human-readable terminal renderer.

use fleetvpn_common::ClientListing;
use owo_colors::OwoColorize as _;

use crate::api::{
    ClientSummary, CreateClientResponse, DeployResponse, DisconnectResponse, DownloadResponse,
    MonitorResponse, OperationResponse, ProvisionResponse, ReinstallResponse, RevokeResponse,
    ServerSummary, SshKeyResponse, StatsResponse, StatusResponse, SyncResponse,
};
use crate::output::OutputContext;

/// Renders API responses as terminal text using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    fn agent_output(&self, output: Option<&str>) {
        if self.ctx.quiet {
            return;
        }
        if let Some(output) = output.filter(|o| !o.trim().is_empty()) {
            for line in output.lines() {
                println!("    {}", line.style(self.ctx.styles.dim));
            }
        }
    }

    pub fn operation(&self, r: &OperationResponse) {
        self.ctx.success(&r.message);
        if let Some(status) = r.status {
            self.ctx.kv("Status:", status.as_str());
        }
        self.agent_output(r.output.as_deref());
    }

    pub fn provision(&self, r: &ProvisionResponse) {
        self.ctx.success(&format!("Provisioned in {} step(s)", r.steps.len()));
        if let Some(status) = r.status {
            self.ctx.kv("Status:", status.as_str());
        }
    }

    pub fn reinstall(&self, r: &ReinstallResponse) {
        self.ctx.success(&r.message);
        for step in &r.steps {
            self.ctx.kv("  step", step);
        }
        self.ctx.kv(
            "Service:",
            if r.service_running { "running" } else { "not running" },
        );
    }

    pub fn status(&self, r: &StatusResponse) {
        self.ctx.kv("Service:", &r.status);
        self.ctx.kv("Recorded:", r.recorded_status.as_str());
        self.ctx
            .kv("Connected:", &format!("{} client(s)", r.connected_clients));
    }

    pub fn monitor(&self, r: &MonitorResponse) {
        if r.servers.is_empty() {
            self.ctx.info("No servers to monitor");
            return;
        }
        if self.ctx.quiet {
            return;
        }
        self.ctx.kv(
            "Checked at:",
            &r.checked_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
        println!(
            "  {}",
            format!("{:<16} {:<13} {:<12} {:>7}", "ID", "STATUS", "SERVICE", "CLIENTS")
                .style(self.ctx.styles.header)
        );
        for s in &r.servers {
            println!(
                "  {:<16} {:<13} {:<12} {:>7}",
                s.id,
                s.recorded_status.as_str().style(self.ctx.styles.status(s.recorded_status)),
                s.service.as_deref().unwrap_or("-"),
                s.connected_clients,
            );
            if let Some(error) = &s.error {
                println!("    {}", error.style(self.ctx.styles.dim));
            }
        }
    }

    pub fn stats(&self, r: &StatsResponse) {
        self.ctx
            .kv("Connected:", &format!("{} client(s)", r.connected_clients));
        self.ctx.kv("Received:", &format_bytes(r.bytes_received));
        self.ctx.kv("Sent:", &format_bytes(r.bytes_sent));
        if r.connections.is_empty() || self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.header("Sessions:");
        for c in &r.connections {
            println!(
                "  {:<20} {:<22} {:<15} ↓{} ↑{}  {}",
                c.common_name,
                c.real_address,
                c.virtual_address,
                format_bytes(c.bytes_received),
                format_bytes(c.bytes_sent),
                c.connected_since.style(self.ctx.styles.dim),
            );
        }
    }

    pub fn disconnect(&self, r: &DisconnectResponse) {
        if r.disconnected {
            self.ctx.success(&r.message);
        } else {
            self.ctx.info(&r.message);
        }
    }

    pub fn client_created(&self, r: &CreateClientResponse) {
        self.ctx.success(&format!("Client '{}' created", r.client_id));
        self.ctx.kv("Bundle:", &r.bundle_path);
        self.ctx.info(&format!(
            "Fetch it with: fleetvpn client download <server> {}",
            r.client_id
        ));
    }

    pub fn download(&self, r: &DownloadResponse) {
        self.ctx.success(&format!(
            "Saved {} ({})",
            r.path,
            format_bytes(r.bytes)
        ));
    }

    pub fn revoke(&self, r: &RevokeResponse) {
        if r.already_revoked {
            self.ctx.info(&r.message);
        } else {
            self.ctx.success(&r.message);
        }
    }

    pub fn sync(&self, r: &SyncResponse) {
        let report = &r.report;
        self.ctx.kv("On server:", &report.clients_on_server.to_string());
        self.ctx.kv("Recorded:", &report.clients_in_db.to_string());
        self.ctx.kv("Removed:", &report.clients_removed.to_string());
        if report.records_removed > report.clients_removed {
            self.ctx.kv("Records deleted:", &report.records_removed.to_string());
        }
        for name in &report.orphaned_clients {
            self.ctx.warn(&format!("'{name}' no longer exists on the server; record removed"));
        }
        for name in &report.new_clients {
            self.ctx.warn(&format!(
                "'{name}' exists on the server but was never issued from here; investigate"
            ));
        }
        for cn in &report.unrecognized_clients {
            self.ctx.warn(&format!(
                "certificate '{cn}' is not a valid client name and was not issued from here; investigate"
            ));
        }
        if report.orphaned_clients.is_empty() && !report.has_unexplained() {
            self.ctx.success("Records match the server");
        }
    }

    pub fn ssh_key(&self, r: &SshKeyResponse) {
        self.ctx
            .success(&format!("{} key installed", r.key_type));
        self.ctx.kv("Private key:", &r.private_key_path);
        self.ctx.kv("Public key:", &r.public_key);
        if r.password_cleared {
            self.ctx.info("Password login will no longer be used for this server");
        }
    }

    pub fn deploy(&self, r: &DeployResponse) {
        self.ctx.success(&r.message);
        self.ctx.kv("SHA-256:", &r.sha256);
    }

    pub fn servers(&self, servers: &[ServerSummary]) {
        if servers.is_empty() {
            self.ctx.info("No servers. Add one with: fleetvpn server add <id> <host>");
            return;
        }
        if self.ctx.quiet {
            return;
        }
        println!(
            "  {}",
            format!(
                "{:<16} {:<24} {:<13} {:<9} {:>7}",
                "ID", "HOST", "STATUS", "AUTH", "CLIENTS"
            )
            .style(self.ctx.styles.header)
        );
        for s in servers {
            println!(
                "  {:<16} {:<24} {:<13} {:<9} {:>7}",
                s.id,
                format!("{}@{}:{}", s.username, s.host, s.port),
                s.status.as_str().style(self.ctx.styles.status(s.status)),
                match (s.auth, s.password_login) {
                    ("key", true) => "key+pw",
                    (auth, _) => auth,
                },
                s.active_clients,
            );
        }
    }

    pub fn clients(&self, clients: &[ClientSummary]) {
        if clients.is_empty() {
            self.ctx.info("No clients recorded for this server");
            return;
        }
        for c in clients {
            let label = format!("{} ({})", c.name, c.status);
            match &c.email {
                Some(email) => self.ctx.kv(&label, email),
                None => self.ctx.kv(&label, &c.created_at),
            }
        }
    }

    pub fn ca_clients(&self, listing: &ClientListing) {
        if listing.clients.is_empty() && listing.unrecognized.is_empty() {
            self.ctx.info("The server's CA has issued no client certificates");
            return;
        }
        for entry in &listing.clients {
            let when = entry
                .revoked_at
                .or(entry.expires_at)
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            self.ctx
                .kv(&format!("{} ({})", entry.name, entry.status), &when);
        }
        for cn in &listing.unrecognized {
            self.ctx.warn(&format!("'{cn}' is not a valid client name"));
        }
    }
}

/// `1536` → `1.5 KiB`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
