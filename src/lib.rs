//! Yacht fleet maintenance core.
//!
//! This module exports the core components for the CLI, testing and
//! integration.

pub mod cli;
pub mod config;
pub mod error;
pub mod fleet;
pub mod format;
pub mod guard;
pub mod hierarchy;
pub mod logging;
pub mod mapping;
pub mod store;
pub mod toggle;
pub mod types;
