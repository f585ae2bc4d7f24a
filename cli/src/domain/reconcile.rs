//! Reconciliation of recorded clients against the host's certificate list.
//!
//! Pure: both sets come in, the report comes out. The caller deletes the
//! orphaned records; new names are only reported, since a certificate nobody
//! recorded is something an operator should look at.

use std::collections::BTreeSet;

use fleetvpn_common::ClientName;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub clients_on_server: usize,
    pub clients_in_db: usize,
    pub clients_removed: usize,
    /// Recorded but absent on the host (`D \ R`).
    pub orphaned_clients: Vec<ClientName>,
    /// Present on the host but never recorded (`R \ D`).
    pub new_clients: Vec<ClientName>,
    /// Certificates whose common name is not a valid client name.
    pub unrecognized_clients: Vec<String>,
    /// Local records deleted while applying the report. One name can carry
    /// several records (revoked history plus a reissue).
    pub records_removed: usize,
}

impl ReconciliationReport {
    /// Attach certificates the host holds under names this tool never issues.
    /// They count towards `clients_on_server` but take no part in the diff.
    #[must_use]
    pub fn with_unrecognized(mut self, names: Vec<String>) -> Self {
        self.clients_on_server += names.len();
        self.unrecognized_clients = names;
        self
    }

    /// Whether the host holds anything nobody recorded.
    #[must_use]
    pub fn has_unexplained(&self) -> bool {
        !self.new_clients.is_empty() || !self.unrecognized_clients.is_empty()
    }
}

#[must_use]
pub fn reconcile(remote: &BTreeSet<ClientName>, recorded: &BTreeSet<ClientName>) -> ReconciliationReport {
    let orphaned_clients: Vec<ClientName> = recorded.difference(remote).cloned().collect();
    let new_clients: Vec<ClientName> = remote.difference(recorded).cloned().collect();
    ReconciliationReport {
        clients_on_server: remote.len(),
        clients_in_db: recorded.len(),
        clients_removed: orphaned_clients.len(),
        orphaned_clients,
        new_clients,
        unrecognized_clients: Vec::new(),
        records_removed: 0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(names: &[&str]) -> BTreeSet<ClientName> {
        names.iter().map(|n| ClientName::parse(*n).unwrap()).collect()
    }

    #[test]
    fn drift_in_both_directions() {
        let report = reconcile(&set(&["alice", "bob"]), &set(&["alice", "carol"]));
        assert_eq!(report.clients_on_server, 2);
        assert_eq!(report.clients_in_db, 2);
        assert_eq!(report.clients_removed, 1);
        assert_eq!(report.orphaned_clients, set(&["carol"]).into_iter().collect::<Vec<_>>());
        assert_eq!(report.new_clients, set(&["bob"]).into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn empty_host_orphans_everything_recorded() {
        let report = reconcile(&BTreeSet::new(), &set(&["alice"]));
        assert_eq!(report.clients_removed, 1);
        assert!(report.new_clients.is_empty());
    }

    #[test]
    fn unrecognized_names_count_on_server_only() {
        let report = reconcile(&set(&["alice"]), &set(&["alice"]))
            .with_unrecognized(vec!["mallory.backdoor".to_string()]);
        assert_eq!(report.clients_on_server, 2);
        assert_eq!(report.clients_removed, 0);
        assert!(report.new_clients.is_empty());
        assert!(report.has_unexplained());
    }

    proptest! {
        #[test]
        fn set_law_holds(
            remote in proptest::collection::btree_set("[a-e]{1,2}", 0..12),
            recorded in proptest::collection::btree_set("[a-e]{1,2}", 0..12),
        ) {
            let remote: BTreeSet<ClientName> = remote.into_iter().map(|n| ClientName::parse(n).unwrap()).collect();
            let recorded: BTreeSet<ClientName> = recorded.into_iter().map(|n| ClientName::parse(n).unwrap()).collect();
            let report = reconcile(&remote, &recorded);

            let both = recorded.intersection(&remote).count();
            prop_assert_eq!(report.clients_in_db - report.clients_removed, both);
            for name in &report.orphaned_clients {
                prop_assert!(recorded.contains(name) && !remote.contains(name));
            }
            for name in &report.new_clients {
                prop_assert!(remote.contains(name) && !recorded.contains(name));
            }
            prop_assert_eq!(report.new_clients.len(), remote.len() - both);
        }
    }
}
