//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` create DTOs for inserts where the dispatcher or its tests
//!   create rows

pub mod credential;
pub mod inventory;
pub mod job;
pub mod queued_job;
pub mod subjob;
