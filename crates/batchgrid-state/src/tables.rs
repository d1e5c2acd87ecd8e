//! redb table definitions for the BatchGrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Job execution records keyed by zero-padded `{job_exe_id}`.
pub const JOB_EXECUTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("job_executions");

/// Queued jobs keyed by zero-padded `{job_exe_id}`.
pub const JOB_QUEUE: TableDefinition<&str, &[u8]> = TableDefinition::new("job_queue");

/// Built-in error kinds keyed by `{name}`.
pub const BUILTIN_ERRORS: TableDefinition<&str, &[u8]> = TableDefinition::new("builtin_errors");

/// Task status updates keyed by `{task_id}:{sequence}`.
pub const TASK_UPDATES: TableDefinition<&str, &[u8]> = TableDefinition::new("task_updates");

/// Scheduler singleton record keyed by `"scheduler"`.
pub const SCHEDULER: TableDefinition<&str, &[u8]> = TableDefinition::new("scheduler");
