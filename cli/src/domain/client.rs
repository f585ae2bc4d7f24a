//! Client records kept per server, and the checks a new client must pass
//! before anything is sent to the host.

use chrono::{DateTime, Utc};
use fleetvpn_common::{CertificateStatus, ClientName, ValidationError, validate_email};
use serde::{Deserialize, Serialize};

/// A client certificate as recorded on the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub name: ClientName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub status: CertificateStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ClientRecord {
    #[must_use]
    pub fn new(name: ClientName, email: Option<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            name,
            email,
            status: CertificateStatus::Active,
            created_at,
            revoked_at: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == CertificateStatus::Active
    }

    /// Mark the record revoked. Revocation is terminal: a revoked record is
    /// never made active again, and revoking twice keeps the first date.
    pub fn revoke(&mut self, at: DateTime<Utc>) {
        if self.is_active() {
            self.status = CertificateStatus::Revoked;
            self.revoked_at = Some(at);
        }
    }
}

/// A validated request for a new client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClient {
    pub name: ClientName,
    pub email: Option<String>,
}

/// Check a requested client against the naming rules and the server's
/// active clients.
///
/// # Errors
///
/// Returns a [`ValidationError`] for a malformed name or email, or when an
/// active client of that name already exists.
pub fn validate_new_client(
    name: &str,
    email: Option<&str>,
    existing: &[ClientRecord],
) -> Result<NewClient, ValidationError> {
    let name = ClientName::parse(name)?;
    let email = match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => {
            validate_email(email)?;
            Some(email.to_string())
        }
        None => None,
    };
    if existing.iter().any(|c| c.is_active() && c.name == name) {
        return Err(ValidationError::DuplicateClient(name.to_string()));
    }
    Ok(NewClient { name, email })
}
