//! Transient SSH credentials.
//!
//! A `ScopedCredential` is moved into the single transport call that needs
//! it and dropped when that call returns, on every path. It is not `Clone`,
//! and its `Debug` output never shows the secret.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

pub struct ScopedCredential {
    password: Arc<SecretString>,
}

impl ScopedCredential {
    #[must_use]
    pub fn password(password: SecretString) -> Self {
        Self {
            password: Arc::new(password),
        }
    }

    /// The secret itself, for a process environment. No copy is made; the
    /// password is zeroized when the credential and every spec holding it
    /// are gone.
    #[must_use]
    pub fn share(&self) -> Arc<SecretString> {
        Arc::clone(&self.password)
    }

    /// Borrow the secret.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.password.expose_secret()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.password.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for ScopedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ScopedCredential(<redacted>)")
    }
}
