//! batchgrid-execution — running job executions.
//!
//! A job execution runs its tasks (optional pre, main, optional post) one
//! after another on the agent it was scheduled to. This crate holds the
//! per-execution state machine, the registry of executions the scheduler
//! is currently tracking, and the narrow interfaces through which terminal
//! outcomes reach durable storage.
//!
//! # Architecture
//!
//! ```text
//! RunningExecutionRegistry
//!   └── JobExeId → Arc<Mutex<RunningJobExecution>>
//!         ├── JobTask per task kind (<job_exe_id>_<kind>)
//!         └── JobOutcomes (failure / completion recorders, built-in errors)
//! ```

pub mod error;
pub mod execution;
pub mod outcome;
pub mod registry;
pub mod task;

pub use error::{ExecutionError, ExecutionResult};
pub use execution::{ExecutionState, RunningJobExecution};
pub use outcome::{
    BuiltinErrors, JobCompletionRecorder, JobFailureRecorder, JobOutcomes, RunningExecutionQuery,
};
pub use registry::{RunningExecutionRegistry, SharedExecution};
pub use task::{JobTask, parse_task_id, task_id};
