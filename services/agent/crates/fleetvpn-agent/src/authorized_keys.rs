//! Installing a controller public key for the login user.
//!
//! The agent runs under sudo, so the key belongs to the invoking user
//! (`SUDO_USER`), not to root, unless an explicit file is configured.

use std::path::{Path, PathBuf};

use fleetvpn_common::{AgentErrorCode, AgentResult, AuthorizeKeyParams, AuthorizedKey, CommandRunner, ProcessSpec};

use crate::error::{ExecError, IoContext};
use crate::executor::{Executor, OutputLog, read_file, write_file};

/// Where the key goes and who must own it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyTarget {
    file: PathBuf,
    owner: Option<String>,
}

/// `algorithm base64` of a key line, ignoring the comment.
fn key_identity(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.split_whitespace();
    Some((parts.next()?, parts.next()?))
}

fn contains_key(existing: &str, key: &str) -> bool {
    let Some(wanted) = key_identity(key) else {
        return false;
    };
    existing
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .any(|line| key_identity(line) == Some(wanted))
}

/// Home directory from a `getent passwd` record.
fn home_from_passwd(record: &str) -> Option<&str> {
    record.trim().split(':').nth(5).filter(|home| !home.is_empty())
}

impl<R: CommandRunner> Executor<R> {
    async fn key_target(&self) -> Result<KeyTarget, ExecError> {
        if let Some(file) = &self.config.authorized_keys {
            return Ok(KeyTarget { file: file.clone(), owner: None });
        }
        let user = std::env::var("SUDO_USER").ok().filter(|u| !u.is_empty() && u != "root");
        let Some(user) = user else {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
            return Ok(KeyTarget {
                file: Path::new(&home).join(".ssh/authorized_keys"),
                owner: None,
            });
        };
        let output = self
            .run(&ProcessSpec::new("getent").args(["passwd", user.as_str()]))
            .await?;
        let record = String::from_utf8_lossy(&output.stdout);
        let home = home_from_passwd(&record).ok_or_else(|| {
            ExecError::rejected(
                AgentErrorCode::NotFound,
                format!("no home directory for user '{user}'"),
            )
        })?;
        Ok(KeyTarget {
            file: Path::new(home).join(".ssh/authorized_keys"),
            owner: Some(user),
        })
    }

    pub(crate) async fn authorize_key(&self, params: &AuthorizeKeyParams) -> Result<AgentResult, ExecError> {
        let target = self.key_target().await?;
        let public_key = params.public_key.trim();
        let ssh_dir = target.file.parent().unwrap_or_else(|| Path::new("."));

        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::create_dir_all(ssh_dir).io_context(|| format!("creating {}", ssh_dir.display()))?;
            std::fs::set_permissions(ssh_dir, std::fs::Permissions::from_mode(0o700))
                .io_context(|| format!("setting permissions on {}", ssh_dir.display()))?;
        }

        let existing = if target.file.exists() { read_file(&target.file)? } else { String::new() };
        let already_present = contains_key(&existing, public_key);
        let mut contents = existing;
        if !already_present {
            if !contents.is_empty() && !contents.ends_with('\n') {
                contents.push('\n');
            }
            contents.push_str(public_key);
            contents.push('\n');
        }
        write_file(&target.file, contents.as_bytes(), 0o600)?;

        let mut log = OutputLog::default();
        if let Some(owner) = &target.owner {
            self.run_checked(
                &mut log,
                "Fixing ownership",
                &ProcessSpec::new("chown").args([
                    "-R".to_string(),
                    format!("{owner}:"),
                    ssh_dir.display().to_string(),
                ]),
            )
            .await?;
        }
        tracing::info!(
            key_type = %params.key_type,
            file = %target.file.display(),
            already_present,
            "public key authorized"
        );

        let message = if already_present {
            "Public key already authorized"
        } else {
            "Public key authorized"
        };
        Ok(AgentResult::ok(message)
            .with_output(log.into_string())
            .with_payload(&AuthorizedKey {
                public_key: public_key.to_string(),
                key_type: params.key_type,
                already_present,
            })?)
    }
}
