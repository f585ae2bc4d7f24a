//! Unit tests for the fleetvpn CLI
//!
//! These tests drive the services through scripted ports and run fast
//! without ssh or filesystem side effects.

mod architecture;
mod certificate_service;
mod credentials_service;
mod helpers;
mod lifecycle_service;
mod mocks;
mod monitoring_service;
