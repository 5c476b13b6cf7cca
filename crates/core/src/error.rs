//! Fatal pipeline conditions that callers may want to tell apart.

use crate::config::MAX_BATCH_SIZE;
use providers::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("service credentials not configured: set {0}")]
    MissingCredentials(String),
    #[error("batch size {0} out of range, must be between 1 and {max}", max = MAX_BATCH_SIZE)]
    InvalidBatchSize(usize),
    #[error("project '{name}' not found (available: {available})")]
    ProjectNotFound { name: String, available: String },
    #[error("project not ready for training: {0}")]
    NotReady(String),
    #[error("training failed to start: {0}")]
    TrainingSubmit(#[source] ServiceError),
    #[error("training iteration {iteration} ended with status {status}")]
    TrainingFailed { iteration: String, status: String },
}
