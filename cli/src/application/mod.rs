//! Application layer — port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain` — never on `crate::infra`,
//! `crate::commands`, or `crate::output`.

pub mod gate;
pub mod ports;
pub mod services;

pub use gate::{GatePermit, InMemoryGate};
pub use ports::{
    AgentInstaller, AgentTransport, BundleFetch, ConfigStore, CredentialSource, GeneratedKeyPair,
    InventoryStore, KeyGenerator, KeyStore, OperationGate, ProgressReporter,
};
