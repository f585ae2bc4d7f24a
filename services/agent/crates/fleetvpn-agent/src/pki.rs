//! Certificate authority operations through easy-rsa, and the client
//! certificate lifecycle built on them.
//!
//! The CA's `index.txt` is the record of every certificate ever issued:
//! one line per certificate, `V` (valid), `R` (revoked) or `E` (expired),
//! with the subject in the last column.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use fleetvpn_common::{
    AgentErrorCode, AgentResult, CaSubject, CertificateStatus, ClientEntry, ClientListing,
    ClientName, CommandRunner, CreateClientParams, CreatedClient, ProcessSpec, SERVER_CERT_NAME,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{ExecError, IoContext};
use crate::executor::{Executor, OutputLog, read_file, write_file};
use crate::templates::{self, BundleMaterial};

// ── index.txt ─────────────────────────────────────────────────────────────────

/// One line of the CA database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub common_name: String,
    pub status: CertificateStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

fn parse_cert_time(value: &str) -> Option<DateTime<Utc>> {
    // UTCTime (YYMMDDHHMMSSZ) until 2049, GeneralizedTime after.
    let value = value.split(',').next()?.trim();
    let format = if value.len() == 15 { "%Y%m%d%H%M%SZ" } else { "%y%m%d%H%M%SZ" };
    NaiveDateTime::parse_from_str(value, format)
        .ok()
        .map(|naive| naive.and_utc())
}

fn common_name(subject: &str) -> Option<&str> {
    subject
        .split('/')
        .find_map(|part| part.strip_prefix("CN="))
        .filter(|cn| !cn.is_empty())
}

/// Parse `index.txt`. Malformed lines are skipped.
pub fn parse_index(text: &str) -> Vec<IndexEntry> {
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            let [flag, expiry, revocation, _serial, _file, subject] = fields.as_slice() else {
                return None;
            };
            let status = match *flag {
                "V" | "E" => CertificateStatus::Active,
                "R" => CertificateStatus::Revoked,
                _ => return None,
            };
            Some(IndexEntry {
                common_name: common_name(subject)?.to_string(),
                status,
                expires_at: parse_cert_time(expiry),
                revoked_at: match status {
                    CertificateStatus::Revoked => parse_cert_time(revocation),
                    CertificateStatus::Active => None,
                },
            })
        })
        .collect()
}

/// Collapse index entries to one per client name, excluding the server
/// certificate. A name with any valid certificate is active. Common names
/// that are not valid client names are reported separately, never dropped.
pub fn client_listing(index: &[IndexEntry]) -> ClientListing {
    let mut by_name: BTreeMap<&str, &IndexEntry> = BTreeMap::new();
    for entry in index {
        if entry.common_name == SERVER_CERT_NAME {
            continue;
        }
        by_name
            .entry(entry.common_name.as_str())
            .and_modify(|current| {
                if current.status == CertificateStatus::Revoked
                    && entry.status == CertificateStatus::Active
                {
                    *current = entry;
                }
            })
            .or_insert(entry);
    }
    let mut listing = ClientListing::default();
    for (common_name, entry) in by_name {
        match ClientName::parse(common_name) {
            Ok(name) => listing.clients.push(ClientEntry {
                name,
                status: entry.status,
                expires_at: entry.expires_at,
                revoked_at: entry.revoked_at,
            }),
            Err(_) => {
                tracing::warn!(common_name, "certificate with a foreign common name in the CA index");
                listing.unrecognized.push(common_name.to_string());
            }
        }
    }
    listing
}

// ── Handlers ──────────────────────────────────────────────────────────────────

impl<R: CommandRunner> Executor<R> {
    fn pki_path(&self, relative: &str) -> PathBuf {
        self.config.pki_dir().join(relative)
    }

    pub(crate) fn ca_exists(&self) -> bool {
        self.pki_path("ca.crt").exists()
    }

    fn require_pki(&self) -> Result<(), ExecError> {
        if self.ca_exists() {
            Ok(())
        } else {
            Err(ExecError::rejected(
                AgentErrorCode::PkiMissing,
                "PKI not initialized; configure the server first",
            ))
        }
    }

    fn read_index(&self) -> Result<Vec<IndexEntry>, ExecError> {
        let path = self.pki_path("index.txt");
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(parse_index(&read_file(&path)?))
    }

    /// Fresh easy-rsa tree, CA, server certificate, DH parameters, TLS key
    /// and an initial CRL.
    pub(crate) async fn build_pki(&self, subject: &CaSubject, log: &mut OutputLog) -> Result<(), ExecError> {
        let dir = &self.config.easy_rsa_dir;
        if dir.exists() {
            std::fs::remove_dir_all(dir).io_context(|| format!("removing {}", dir.display()))?;
        }
        std::fs::create_dir_all(dir).io_context(|| format!("creating {}", dir.display()))?;
        let source = format!("{}/.", self.config.easy_rsa_source.display());
        self.run_checked(
            log,
            "Copying easy-rsa files",
            &ProcessSpec::new("cp").args(["-a".to_string(), source, dir.display().to_string()]),
        )
        .await?;
        write_file(&dir.join("vars"), templates::easy_rsa_vars(subject).as_bytes(), 0o644)?;

        self.run_checked(log, "Initializing PKI", &self.easyrsa(["init-pki"])).await?;
        self.run_checked(
            log,
            "Building Certificate Authority",
            &self
                .easyrsa(["build-ca", "nopass"])
                .env("EASYRSA_REQ_CN", subject.common_name.as_str()),
        )
        .await?;
        self.run_checked(
            log,
            "Generating server certificate request",
            &self.easyrsa(["gen-req", SERVER_CERT_NAME, "nopass"]),
        )
        .await?;
        self.run_checked(
            log,
            "Signing server certificate",
            &self.easyrsa(["sign-req", "server", SERVER_CERT_NAME]),
        )
        .await?;
        self.run_checked(
            log,
            "Generating DH parameters",
            &self.easyrsa(["gen-dh"]).timeout(self.package_timeout()),
        )
        .await?;
        self.run_checked(
            log,
            "Generating TLS-Crypt key",
            &ProcessSpec::new("openvpn")
                .args(["--genkey", "secret", "ta.key"])
                .current_dir(dir),
        )
        .await?;
        self.run_checked(log, "Generating Certificate Revocation List", &self.easyrsa(["gen-crl"]))
            .await?;
        Ok(())
    }

    /// Copy the server's key material into the OpenVPN directory.
    pub(crate) async fn install_server_artifacts(&self, log: &mut OutputLog) -> Result<(), ExecError> {
        let target = &self.config.openvpn_dir;
        let files = [
            (self.pki_path("ca.crt"), "ca.crt", 0o644),
            (self.pki_path("issued/server.crt"), "server.crt", 0o644),
            (self.pki_path("private/server.key"), "server.key", 0o600),
            (self.pki_path("dh.pem"), "dh.pem", 0o644),
            (self.config.easy_rsa_dir.join("ta.key"), "ta.key", 0o600),
        ];
        for (source, name, mode) in files {
            let contents =
                std::fs::read(&source).io_context(|| format!("reading {}", source.display()))?;
            write_file(&target.join(name), &contents, mode)?;
        }
        log.note("Installing certificates", "CA, server certificate, key, DH and TLS key installed");
        self.publish_crl(log)
    }

    /// Copy the CRL next to `server.conf`, world-readable so the daemon
    /// can read it after dropping privileges.
    fn publish_crl(&self, log: &mut OutputLog) -> Result<(), ExecError> {
        let crl = self.pki_path("crl.pem");
        let contents = std::fs::read(&crl).io_context(|| format!("reading {}", crl.display()))?;
        write_file(&self.config.openvpn_dir.join("crl.pem"), &contents, 0o644)?;
        log.note("Publishing CRL", "crl.pem updated");
        Ok(())
    }

    pub(crate) async fn list_clients(&self) -> Result<AgentResult, ExecError> {
        self.require_pki()?;
        let listing = client_listing(&self.read_index()?);
        let active = listing
            .clients
            .iter()
            .filter(|c| c.status == CertificateStatus::Active)
            .count();
        let mut message = format!("Found {} client(s), {active} active", listing.clients.len());
        if !listing.unrecognized.is_empty() {
            message.push_str(&format!(", {} unrecognized", listing.unrecognized.len()));
        }
        Ok(AgentResult::ok(message).with_payload(&listing)?)
    }

    pub(crate) async fn create_client(&self, params: &CreateClientParams) -> Result<AgentResult, ExecError> {
        self.require_pki()?;
        let name = &params.name;
        let cert_path = self.pki_path(&format!("issued/{name}.crt"));
        if cert_path.exists() {
            return Err(ExecError::rejected(
                AgentErrorCode::AlreadyExists,
                format!("client '{name}' already exists"),
            ));
        }

        let mut log = OutputLog::default();
        self.run_checked(
            &mut log,
            "Generating client certificate",
            &self.easyrsa(["build-client-full", name.as_str(), "nopass"]),
        )
        .await?;

        let ca = read_file(&self.pki_path("ca.crt"))?;
        let cert = read_file(&cert_path)?;
        let key = read_file(&self.pki_path(&format!("private/{name}.key")))?;
        let ta_path = self.config.easy_rsa_dir.join("ta.key");
        let tls_crypt = ta_path.exists().then(|| read_file(&ta_path)).transpose()?;

        let bundle = templates::client_bundle(
            params,
            &BundleMaterial {
                ca: templates::pem_blocks(&ca),
                cert: templates::pem_blocks(&cert),
                key: key.trim_end(),
                tls_crypt: tls_crypt.as_deref().map(str::trim_end),
            },
        );
        let bundle_path = self.config.bundle_path(&name.bundle_file_name());
        write_file(&bundle_path, bundle.as_bytes(), 0o600)?;
        tracing::info!(client = %name, "client certificate issued");

        Ok(AgentResult::ok(format!("Client '{name}' created successfully"))
            .with_output(log.into_string())
            .with_payload(&CreatedClient {
                client_id: name.clone(),
                bundle_path: bundle_path.display().to_string(),
            })?)
    }

    pub(crate) async fn revoke_client(&self, name: &ClientName) -> Result<AgentResult, ExecError> {
        self.require_pki()?;
        let entries = self.read_index()?;
        let mine: Vec<&IndexEntry> = entries.iter().filter(|e| e.common_name == name.as_str()).collect();
        if mine.is_empty() {
            return Err(ExecError::rejected(
                AgentErrorCode::NotFound,
                format!("client '{name}' not found"),
            ));
        }
        if mine.iter().all(|e| e.status == CertificateStatus::Revoked) {
            return Err(ExecError::rejected(
                AgentErrorCode::AlreadyRevoked,
                format!("client '{name}' is already revoked"),
            ));
        }

        let mut log = OutputLog::default();
        let output = self.run(&self.easyrsa(["revoke", name.as_str()])).await?;
        log.record("Revoking certificate", &output);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.to_lowercase().contains("already revoked") {
                return Err(ExecError::CommandFailed {
                    command: format!("easyrsa revoke {name}"),
                    code: output.status.code().unwrap_or(-1),
                    stderr: stderr.trim().to_string(),
                });
            }
        }
        self.run_checked(&mut log, "Updating CRL", &self.easyrsa(["gen-crl"])).await?;
        self.publish_crl(&mut log)?;

        let bundle = self.config.bundle_path(&name.bundle_file_name());
        if bundle.exists() {
            std::fs::remove_file(&bundle).io_context(|| format!("removing {}", bundle.display()))?;
        }
        tracing::info!(client = %name, "client certificate revoked");

        Ok(AgentResult::ok(format!("Client '{name}' revoked successfully"))
            .with_output(log.into_string())
            .with_payload(&serde_json::json!({ "client_name": name, "revoked": true }))?)
    }

    /// Stream a client's bundle into `sink`.
    pub async fn fetch_bundle<W>(&self, name: &ClientName, sink: &mut W) -> Result<u64, ExecError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let path = self.config.bundle_path(&name.bundle_file_name());
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExecError::rejected(
                    AgentErrorCode::NotFound,
                    format!("no configuration bundle for client '{name}'"),
                ));
            }
            Err(source) => {
                return Err(ExecError::Io {
                    context: format!("opening {}", path.display()),
                    source,
                });
            }
        };
        let copied = tokio::io::copy(&mut file, sink)
            .await
            .io_context(|| format!("streaming {}", path.display()))?;
        sink.flush().await.io_context(|| "flushing output".to_string())?;
        Ok(copied)
    }
}
