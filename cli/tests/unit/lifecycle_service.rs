//! Lifecycle orchestration: provisioning, reinstall, gating and timeouts.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use fleetvpn_cli::application::gate::InMemoryGate;
use fleetvpn_cli::application::ports::OperationGate;
use fleetvpn_cli::application::services::lifecycle::{
    ServiceAction, configure, control, install, provision, reinstall,
};
use fleetvpn_cli::domain::{OrchestrationError, ServerStatus, TransportError};
use fleetvpn_common::{AgentResult, CommandName, ReinstallOutcome, ServiceState, VpnSettings};

use crate::helpers::{ok_with, server, server_with_status, service};
use crate::mocks::{RecordingReporter, ScriptedTransport};

const REINSTALL_STEPS: [&str; 5] = ["stopped", "purged", "installed", "configured", "started"];

fn steps() -> Vec<String> {
    REINSTALL_STEPS.iter().map(ToString::to_string).collect()
}

// ── Reinstall ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn confirmed_reinstall_reports_every_step_and_running() {
    let transport = ScriptedTransport::new().then(
        ok_with("Reinstalled", &ReinstallOutcome { service_running: true }).with_steps(steps()),
    );
    let gate = InMemoryGate::new();

    let report = reinstall(&transport, &gate, &server(), VpnSettings::default(), true)
        .await
        .unwrap();

    assert_eq!(report.steps, steps());
    assert!(report.service_running);
    assert_eq!(report.status, ServerStatus::Running);
    assert_eq!(transport.call_names(), vec![CommandName::Reinstall]);
}

#[tokio::test]
async fn unconfirmed_reinstall_never_contacts_the_server() {
    let transport = ScriptedTransport::new();
    let gate = InMemoryGate::new();

    let err = reinstall(&transport, &gate, &server(), VpnSettings::default(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::NotConfirmed(_)));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn reinstall_failing_midway_names_completed_steps() {
    let transport = ScriptedTransport::new().then(
        AgentResult::failed("Reinstall failed", "easyrsa build-ca exited 1")
            .with_steps(vec!["stopped".into(), "purged".into()]),
    );
    let gate = InMemoryGate::new();

    let err = reinstall(&transport, &gate, &server(), VpnSettings::default(), true)
        .await
        .unwrap_err();

    match &err {
        OrchestrationError::PartialFailure { completed, .. } => {
            assert_eq!(completed, &vec!["stopped".to_string(), "purged".to_string()]);
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
    assert_eq!(err.status_hint(), Some(ServerStatus::Error));
}

// ── Provision ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn provision_runs_install_configure_start_in_order() {
    let transport = ScriptedTransport::new()
        .then(AgentResult::ok("Installed"))
        .then(AgentResult::ok("Configured"))
        .then(service(ServiceState::Running));
    let gate = InMemoryGate::new();
    let reporter = RecordingReporter::default();

    let outcome = provision(&transport, &gate, &server(), VpnSettings::default(), &reporter)
        .await
        .unwrap();

    assert_eq!(
        transport.call_names(),
        vec![CommandName::Install, CommandName::Configure, CommandName::ServiceStart]
    );
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.status, Some(ServerStatus::Running));
    assert_eq!(reporter.events.lock().unwrap().len(), 6);
}

#[tokio::test]
async fn provision_halts_at_the_failing_step() {
    let transport = ScriptedTransport::new()
        .then(AgentResult::ok("Installed"))
        .then(AgentResult::failed("Configure failed", "port 1194 in use"));
    let gate = InMemoryGate::new();
    let reporter = RecordingReporter::default();

    let err = provision(&transport, &gate, &server(), VpnSettings::default(), &reporter)
        .await
        .unwrap_err();

    match &err {
        OrchestrationError::StepFailed { step, completed, .. } => {
            assert_eq!(*step, CommandName::Configure);
            assert_eq!(completed, &vec![CommandName::Install]);
        }
        other => panic!("expected step failure, got {other:?}"),
    }
    assert_eq!(transport.calls().len(), 2, "service-start must not be sent");
    assert_eq!(err.status_hint(), Some(ServerStatus::Error));
    assert!(gate.try_exclusive(&server().id).is_ok(), "gate released after failure");
}

// ── Single commands ───────────────────────────────────────────────────────────

#[tokio::test]
async fn install_on_a_running_server_keeps_its_status() {
    let transport = ScriptedTransport::new().then(AgentResult::ok("Already installed"));
    let gate = InMemoryGate::new();
    let running = server_with_status(ServerStatus::Running);

    let outcome = install(&transport, &gate, &running).await.unwrap();

    assert!(outcome.result.success);
    assert_eq!(outcome.status, Some(ServerStatus::Running));
}

#[tokio::test]
async fn configure_marks_server_configured() {
    let transport = ScriptedTransport::new().then(AgentResult::ok("Configured"));
    let gate = InMemoryGate::new();

    let outcome = configure(&transport, &gate, &server(), VpnSettings::default(), false)
        .await
        .unwrap();

    assert_eq!(outcome.status, Some(ServerStatus::Configured));
}

#[tokio::test]
async fn invalid_settings_are_rejected_before_dispatch() {
    let transport = ScriptedTransport::new();
    let gate = InMemoryGate::new();
    let settings = VpnSettings {
        port: 0,
        ..VpnSettings::default()
    };

    let err = configure(&transport, &gate, &server(), settings, false)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::Validation(_)));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn stop_records_the_state_the_agent_reports() {
    let transport = ScriptedTransport::new().then(service(ServiceState::Stopped));
    let gate = InMemoryGate::new();

    let outcome = control(&transport, &gate, &server(), ServiceAction::Stop)
        .await
        .unwrap();

    assert_eq!(outcome.status, Some(ServerStatus::Stopped));
}

// ── Gating ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_lifecycle_operation_is_rejected_not_queued() {
    let transport = ScriptedTransport::new();
    let gate = InMemoryGate::new();
    let _in_flight = gate.try_exclusive(&server().id).unwrap();

    let err = install(&transport, &gate, &server()).await.unwrap_err();

    assert!(matches!(err, OrchestrationError::Busy(_)));
    assert!(transport.calls().is_empty());
}

// ── Timeouts ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn timeout_leaves_the_outcome_unknown() {
    let transport = ScriptedTransport::new().then_fail(TransportError::Timeout {
        host: "203.0.113.7".into(),
        command: CommandName::ServiceRestart,
        after: Duration::from_secs(60),
    });
    let gate = InMemoryGate::new();

    let err = control(&transport, &gate, &server(), ServiceAction::Restart)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::Timeout { .. }));
    assert_eq!(err.status_hint(), Some(ServerStatus::Unknown));
    assert_eq!(transport.calls().len(), 1, "a timed-out command is never resent");
}

#[tokio::test]
async fn connect_failure_leaves_status_alone() {
    let transport = ScriptedTransport::new().then_fail(TransportError::Connect {
        host: "203.0.113.7".into(),
        reason: "Connection refused".into(),
    });
    let gate = InMemoryGate::new();

    let err = install(&transport, &gate, &server()).await.unwrap_err();

    assert_eq!(err.status_hint(), None);
    assert_eq!(err.kind(), "transport");
}
