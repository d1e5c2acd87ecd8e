//! Execution error types.

use thiserror::Error;

/// Errors that can occur while driving a running job execution.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("state store error: {0}")]
    State(#[from] batchgrid_state::StateError),

    #[error("task {task_id} is not the current task of job execution {job_exe_id}")]
    UnknownTask { job_exe_id: u64, task_id: String },

    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    #[error("job execution {0} has no agent")]
    NoAgent(u64),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
