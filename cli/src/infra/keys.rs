//! SSH key generation and controller-side key storage.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use fleetvpn_common::KeyType;
use secrecy::{ExposeSecret, SecretString};
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, HashAlg, LineEnding, PrivateKey};

use crate::application::ports::{GeneratedKeyPair, KeyGenerator, KeyStore};
use crate::domain::ServerId;
use crate::infra::fs::{create_private_dir, fleet_home, set_mode};

/// Generates OpenSSH key pairs in-process.
pub struct SshKeyGenerator;

impl KeyGenerator for SshKeyGenerator {
    fn generate(&self, key_type: KeyType, comment: &str) -> Result<GeneratedKeyPair> {
        let algorithm = match key_type {
            KeyType::Ed25519 => Algorithm::Ed25519,
            KeyType::Rsa => Algorithm::Rsa {
                hash: Some(HashAlg::Sha512),
            },
        };
        let mut private_key = PrivateKey::random(&mut OsRng, algorithm)
            .with_context(|| format!("generating {key_type} key"))?;
        private_key.set_comment(comment);

        let public_key = private_key
            .public_key()
            .to_openssh()
            .context("encoding public key")?;
        let encoded = private_key
            .to_openssh(LineEnding::LF)
            .context("encoding private key")?;
        Ok(GeneratedKeyPair {
            public_key,
            private_key: SecretString::new(encoded.to_string()),
        })
    }
}

/// Keeps private keys under `<home>/keys/<server-id>`, mode 0600.
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self::with_dir(fleet_home()?.join("keys")))
    }

    #[must_use]
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl KeyStore for FileKeyStore {
    fn store(&self, server: &ServerId, private_key: &SecretString) -> Result<PathBuf> {
        create_private_dir(&self.dir)?;
        let path = self.dir.join(server.as_str());

        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("creating temp file in {}", self.dir.display()))?;
        set_mode(temp.path(), 0o600)?;
        temp.write_all(private_key.expose_secret().as_bytes())
            .context("writing private key")?;
        temp.flush().context("writing private key")?;
        temp.persist(&path)
            .with_context(|| format!("saving private key {}", path.display()))?;
        Ok(path)
    }
}
