//! Record types for the BatchGrid state store.
//!
//! These types represent the persisted state of job executions, queued
//! work, built-in errors, and task status updates. All types are
//! serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};

use batchgrid_resources::NodeResources;

/// Unique identifier for a job execution.
pub type JobExeId = u64;

// ── Job execution ─────────────────────────────────────────────────

/// Durable record of one attempt to run a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobExecutionRecord {
    pub id: JobExeId,
    pub job_type: String,
    pub status: ExecutionStatus,
    /// Agent the execution was scheduled on (set once scheduled).
    pub agent_id: Option<String>,
    pub priority: u32,
    /// Resources each task of this execution requests.
    pub resources: NodeResources,
    /// Tasks this execution runs, in order.
    pub tasks: Vec<TaskKind>,
    /// Unix timestamp (seconds) when queued.
    pub queued_at: u64,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    /// Name of the built-in error the execution failed with.
    pub error: Option<String>,
    /// Results of every task that reported a terminal outcome.
    pub task_results: Vec<TaskResults>,
}

/// Lifecycle status of a job execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Kind of task within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Pre,
    Main,
    Post,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Main => "main",
            Self::Post => "post",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pre" => Some(Self::Pre),
            "main" => Some(Self::Main),
            "post" => Some(Self::Post),
            _ => None,
        }
    }
}

/// Outcome details reported for one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResults {
    pub task_id: String,
    pub exit_code: Option<i32>,
    /// Unix timestamp (seconds) of the reported outcome.
    pub when: u64,
}

impl TaskResults {
    pub fn new(task_id: impl Into<String>, when: u64) -> Self {
        Self {
            task_id: task_id.into(),
            exit_code: None,
            when,
        }
    }
}

// ── Queue ─────────────────────────────────────────────────────────

/// A job waiting for capacity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedJob {
    pub job_exe_id: JobExeId,
    pub job_type: String,
    /// Lower value schedules first.
    pub priority: u32,
    pub resources: NodeResources,
    pub tasks: Vec<TaskKind>,
    pub queued_at: u64,
}

/// Request to enqueue a new job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub job_type: String,
    pub priority: u32,
    pub resources: NodeResources,
    pub tasks: Vec<TaskKind>,
}

// ── Errors ────────────────────────────────────────────────────────

/// Category of a built-in error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    System,
    Algorithm,
    Data,
}

/// An error kind the system itself can assign to failed executions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuiltinError {
    pub name: String,
    pub title: String,
    pub description: String,
    pub category: ErrorCategory,
}

/// Execution the scheduler has no in-memory record of.
pub const SCHEDULER_LOST: &str = "scheduler-lost";
/// Execution whose agent was lost.
pub const NODE_LOST: &str = "node-lost";
/// Task reported lost by the cluster manager.
pub const TASK_LOST: &str = "task-lost";
/// Task ended in error, failure, or was killed.
pub const TASK_FAILED: &str = "task-failed";
/// Task could not be handed to the cluster manager.
pub const LAUNCH_FAILED: &str = "launch-failed";

/// Every built-in error seeded by `StateStore::initialize_system`.
pub fn builtin_errors() -> Vec<BuiltinError> {
    let system = |name: &str, title: &str, description: &str| BuiltinError {
        name: name.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        category: ErrorCategory::System,
    };
    vec![
        system(
            SCHEDULER_LOST,
            "Scheduler Lost",
            "The scheduler lost track of this execution, most likely across a restart.",
        ),
        system(NODE_LOST, "Node Lost", "The node running this execution was lost."),
        system(TASK_LOST, "Task Lost", "The cluster manager reported the task as lost."),
        system(
            TASK_FAILED,
            "Task Failed",
            "The task exited with an error or was killed.",
        ),
        system(
            LAUNCH_FAILED,
            "Launch Failed",
            "The task could not be launched on its node.",
        ),
    ]
}

// ── Task updates ──────────────────────────────────────────────────

/// Task state as reported by the cluster manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
    Error,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Killed | Self::Lost | Self::Error
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staging => "TASK_STAGING",
            Self::Starting => "TASK_STARTING",
            Self::Running => "TASK_RUNNING",
            Self::Finished => "TASK_FINISHED",
            Self::Failed => "TASK_FAILED",
            Self::Killed => "TASK_KILLED",
            Self::Lost => "TASK_LOST",
            Self::Error => "TASK_ERROR",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status update for a task, as logged durably.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskUpdate {
    pub task_id: String,
    pub agent_id: String,
    pub state: TaskState,
    /// Unix timestamp (seconds) the cluster manager observed the state.
    pub timestamp: u64,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
}

// ── Scheduler ─────────────────────────────────────────────────────

/// The master the scheduler is registered with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerRecord {
    pub framework_id: Option<String>,
    pub master_hostname: String,
    pub master_port: u16,
    pub updated_at: u64,
}

/// Zero-padded key for numeric IDs so lexical order matches numeric order.
pub fn job_exe_key(id: JobExeId) -> String {
    format!("{id:020}")
}
