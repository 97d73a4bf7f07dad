//! In-process sink that records submissions.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{JobSink, OutboundJob, SinkError};

/// Keeps every accepted job in submission order.
///
/// After [`close`](MemoryJobQueue::close) every submission fails with
/// [`SinkError::Closed`].
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    jobs: Vec<OutboundJob>,
    closed: bool,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject all further submissions.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
    }

    /// Snapshot of accepted jobs.
    pub async fn submitted(&self) -> Vec<OutboundJob> {
        self.state.lock().await.jobs.clone()
    }

    /// Accepted jobs of one type.
    pub async fn submitted_of(&self, job_type: &str) -> Vec<OutboundJob> {
        self.state
            .lock()
            .await
            .jobs
            .iter()
            .filter(|job| job.job_type == job_type)
            .cloned()
            .collect()
    }

    /// Drain and return accepted jobs.
    pub async fn take(&self) -> Vec<OutboundJob> {
        std::mem::take(&mut self.state.lock().await.jobs)
    }
}

#[async_trait]
impl JobSink for MemoryJobQueue {
    async fn submit(&self, job: OutboundJob) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(SinkError::Closed);
        }
        state.jobs.push(job);
        Ok(())
    }
}
