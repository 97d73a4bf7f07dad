//! Pure dispatch domain logic.
//!
//! No database or runtime dependencies: tier rules, capacity allocation and
//! credential lease policy are plain functions so both the repository layer
//! and the dispatcher can share them.

pub mod allocation;
pub mod credentials;
pub mod eligibility;
pub mod error;
pub mod job_types;
pub mod status;
pub mod types;
