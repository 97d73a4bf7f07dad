//! Repository layer: one zero-sized struct per table group.

pub mod credential_repo;
pub mod inventory_repo;
pub mod job_repo;
pub mod queued_job_repo;
pub mod subjob_repo;

pub use credential_repo::CredentialRepo;
pub use inventory_repo::InventoryRepo;
pub use job_repo::JobRepo;
pub use queued_job_repo::QueuedJobRepo;
pub use subjob_repo::SubjobRepo;
