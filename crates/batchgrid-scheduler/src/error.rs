//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur while handling scheduler events.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("state store error: {0}")]
    State(#[from] batchgrid_state::StateError),

    #[error("execution error: {0}")]
    Execution(#[from] batchgrid_execution::ExecutionError),

    #[error("driver error: {0}")]
    Driver(#[from] anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
