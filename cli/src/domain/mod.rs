//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod inventory;
pub mod reconcile;
pub mod server;

pub use client::{ClientRecord, NewClient, validate_new_client};
pub use config::{FleetConfig, HostKeyPolicy, SshSettings};
pub use credential::ScopedCredential;
pub use error::{InventoryError, OrchestrationError, TransportError};
pub use inventory::{Inventory, ServerEntry};
pub use reconcile::{ReconciliationReport, reconcile};
pub use server::{AuthMethod, Server, ServerId, ServerStatus};
