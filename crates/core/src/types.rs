//! Primitive aliases shared across the workspace.

/// Primary key of every table (`BIGSERIAL`).
pub type DbId = i64;

/// An instant in UTC. Every timestamp column is `TIMESTAMPTZ`.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
