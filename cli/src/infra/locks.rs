//! Cross-process implementation of the `OperationGate` port.
//!
//! Each `fleetvpn` invocation is its own process, so holds are lock files:
//! `<id>.lock` for an exclusive hold and `<id>.shared.<pid>-<n>` for each
//! shared one. Files left behind by a process that no longer exists are
//! ignored and cleaned up.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;

use crate::application::gate::GatePermit;
use crate::application::ports::OperationGate;
use crate::domain::{OrchestrationError, ServerId};
use crate::infra::fs::{create_private_dir, fleet_home};

static SHARED_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct LockFileGate {
    dir: PathBuf,
}

impl LockFileGate {
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        Ok(Self::with_dir(fleet_home()?.join("locks")))
    }

    #[must_use]
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn exclusive_path(&self, server: &ServerId) -> PathBuf {
        self.dir.join(format!("{server}.lock"))
    }

    fn shared_prefix(server: &ServerId) -> String {
        format!("{server}.shared.")
    }

    fn prepare(&self, server: &ServerId) -> Result<(), OrchestrationError> {
        create_private_dir(&self.dir).map_err(|e| {
            tracing::warn!(error = %format!("{e:#}"), "cannot create lock directory");
            OrchestrationError::Busy(server.clone())
        })
    }

    /// Whether a live process holds `server` exclusively.
    fn exclusive_held(&self, server: &ServerId) -> bool {
        held_by_live_process(&self.exclusive_path(server))
    }

    fn shared_held(&self, server: &ServerId) -> bool {
        let prefix = Self::shared_prefix(server);
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return false;
        };
        entries.flatten().any(|entry| {
            entry.file_name().to_string_lossy().starts_with(&prefix)
                && held_by_live_process(&entry.path())
        })
    }
}

fn release_file(path: PathBuf) -> GatePermit {
    GatePermit::new(move || {
        if let Err(err) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %err, "cannot remove lock file");
        }
    })
}

fn write_lock(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    write!(file, "{}", std::process::id())
}

/// A lock file counts while its recorded process is alive. A stale file is
/// removed on sight.
fn held_by_live_process(path: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(path) else {
        return false;
    };
    let Ok(pid) = content.trim().parse::<u32>() else {
        return true;
    };
    if process_alive(pid) {
        return true;
    }
    tracing::debug!(path = %path.display(), pid, "removing stale lock");
    let _ = std::fs::remove_file(path);
    false
}

fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let proc_root = Path::new("/proc");
    if proc_root.is_dir() {
        proc_root.join(pid.to_string()).exists()
    } else {
        true
    }
}

impl OperationGate for LockFileGate {
    fn try_exclusive(&self, server: &ServerId) -> Result<GatePermit, OrchestrationError> {
        self.prepare(server)?;
        let path = self.exclusive_path(server);
        if let Err(err) = write_lock(&path) {
            if err.kind() != std::io::ErrorKind::AlreadyExists || self.exclusive_held(server) {
                return Err(OrchestrationError::Busy(server.clone()));
            }
            write_lock(&path).map_err(|_| OrchestrationError::Busy(server.clone()))?;
        }
        let permit = release_file(path);
        if self.shared_held(server) {
            return Err(OrchestrationError::Busy(server.clone()));
        }
        Ok(permit)
    }

    fn try_shared(&self, server: &ServerId) -> Result<GatePermit, OrchestrationError> {
        self.prepare(server)?;
        if self.exclusive_held(server) {
            return Err(OrchestrationError::Busy(server.clone()));
        }
        let seq = SHARED_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!(
            "{}{}-{seq}",
            Self::shared_prefix(server),
            std::process::id()
        ));
        write_lock(&path).map_err(|_| OrchestrationError::Busy(server.clone()))?;
        let permit = release_file(path);
        if self.exclusive_held(server) {
            return Err(OrchestrationError::Busy(server.clone()));
        }
        Ok(permit)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn id(s: &str) -> ServerId {
        ServerId::parse(s).unwrap()
    }

    #[test]
    fn exclusive_excludes_everything_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let gate = LockFileGate::with_dir(dir.path().to_path_buf());
        let held = gate.try_exclusive(&id("fra-1")).unwrap();
        assert!(matches!(gate.try_exclusive(&id("fra-1")), Err(OrchestrationError::Busy(_))));
        assert!(gate.try_shared(&id("fra-1")).is_err());
        assert!(gate.try_shared(&id("ams-2")).is_ok());
        drop(held);
        assert!(!dir.path().join("fra-1.lock").exists());
        assert!(gate.try_exclusive(&id("fra-1")).is_ok());
    }

    #[test]
    fn shared_holds_coexist_and_block_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let gate = LockFileGate::with_dir(dir.path().to_path_buf());
        let a = gate.try_shared(&id("fra-1")).unwrap();
        let b = gate.try_shared(&id("fra-1")).unwrap();
        assert!(gate.try_exclusive(&id("fra-1")).is_err());
        assert!(!dir.path().join("fra-1.lock").exists());
        drop((a, b));
        assert!(gate.try_exclusive(&id("fra-1")).is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn lock_left_by_dead_process_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        // Far above any default pid_max.
        std::fs::write(dir.path().join("fra-1.lock"), "999999999").unwrap();
        let gate = LockFileGate::with_dir(dir.path().to_path_buf());
        assert!(gate.try_exclusive(&id("fra-1")).is_ok());
    }
}
