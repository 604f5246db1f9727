//! Queue error types.

use douga_models::TransitionError;
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl QueueError {
    pub fn job_not_found(id: impl ToString) -> Self {
        Self::JobNotFound(id.to_string())
    }
}
