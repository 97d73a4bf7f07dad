use fanout_core::error::CoreError;
use fanout_queue::SinkError;

/// Failure of one dispatch or maintenance run.
///
/// Periodic jobs log these and carry on with the next tick.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job submission failed: {0}")]
    Sink(#[from] SinkError),
}
