//! Errors returned by [`StateStore`](crate::StateStore).
//!
//! Storage failures carry the redb message as text. The remaining variants
//! describe records that are missing or not in the state an operation needs.

use thiserror::Error;

use crate::types::JobExeId;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open state database: {0}")]
    Open(String),

    #[error("state transaction failed: {0}")]
    Transaction(String),

    #[error("failed to open table: {0}")]
    Table(String),

    #[error("state read failed: {0}")]
    Read(String),

    #[error("state write failed: {0}")]
    Write(String),

    #[error("failed to encode record: {0}")]
    Serialize(String),

    #[error("failed to decode record: {0}")]
    Deserialize(String),

    /// Scheduling was attempted for a job execution that is no longer queued.
    #[error("job execution {0} is not queued")]
    QueueConflict(JobExeId),

    #[error("no job execution {0}")]
    UnknownExecution(JobExeId),

    #[error("not found: {0}")]
    NotFound(String),
}
