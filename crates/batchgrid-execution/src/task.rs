//! Job tasks and task IDs.
//!
//! Every task of a job execution is named `<job_exe_id>_<kind>`, so a
//! status update can always be routed back to its execution.

use batchgrid_resources::NodeResources;
use batchgrid_state::{JobExeId, TaskKind};

use crate::error::{ExecutionError, ExecutionResult};

/// Build the task ID for one task of an execution.
pub fn task_id(job_exe_id: JobExeId, kind: TaskKind) -> String {
    format!("{job_exe_id}_{}", kind.as_str())
}

/// Split a task ID into its execution ID and task kind.
pub fn parse_task_id(task_id: &str) -> ExecutionResult<(JobExeId, TaskKind)> {
    let (id, kind) = task_id
        .rsplit_once('_')
        .ok_or_else(|| ExecutionError::InvalidTaskId(task_id.to_string()))?;
    let id = id
        .parse::<JobExeId>()
        .map_err(|_| ExecutionError::InvalidTaskId(task_id.to_string()))?;
    let kind =
        TaskKind::parse(kind).ok_or_else(|| ExecutionError::InvalidTaskId(task_id.to_string()))?;
    Ok((id, kind))
}

/// One task of a job execution, bound to the execution's agent.
#[derive(Debug, Clone, PartialEq)]
pub struct JobTask {
    pub id: String,
    pub job_exe_id: JobExeId,
    pub kind: TaskKind,
    pub agent_id: String,
    pub resources: NodeResources,
    /// Unix timestamps (seconds) of the task's lifecycle.
    pub launched: Option<u64>,
    pub started: Option<u64>,
    pub ended: Option<u64>,
    pub exit_code: Option<i32>,
}

impl JobTask {
    pub fn new(
        job_exe_id: JobExeId,
        kind: TaskKind,
        agent_id: impl Into<String>,
        resources: NodeResources,
    ) -> Self {
        Self {
            id: task_id(job_exe_id, kind),
            job_exe_id,
            kind,
            agent_id: agent_id.into(),
            resources,
            launched: None,
            started: None,
            ended: None,
            exit_code: None,
        }
    }

    /// Launched and not yet ended.
    pub fn is_active(&self) -> bool {
        self.launched.is_some() && self.ended.is_none()
    }
}
