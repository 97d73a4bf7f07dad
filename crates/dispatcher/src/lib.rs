//! Credential-gated dispatcher.
//!
//! Periodically hands due jobs and ready subjobs to the worker fleet, never
//! more than the number of usable worker credentials, and keeps the
//! credential ledger healthy.

pub mod config;
pub mod cycle;
pub mod error;
pub mod provisioner;
pub mod reaper;
pub mod scheduler;
