//! Integration tests for the fleetvpn CLI
//!
//! These tests spawn the actual binary against a throwaway `FLEETVPN_HOME`.
//! Nothing here reaches an ssh server: every case fails or finishes before
//! the first connection.

mod cli_tests;
mod inventory_commands;
