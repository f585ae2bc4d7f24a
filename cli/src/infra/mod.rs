//! Infrastructure layer — concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: the ssh transport, the
//! inventory and config files, key storage, and lock files.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod config;
pub mod fs;
pub mod inventory;
pub mod keys;
pub mod locks;
pub mod ssh;
