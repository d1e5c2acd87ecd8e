//! `RunningJobExecution` — the in-memory state machine of one job execution.
//!
//! ```text
//! Scheduled ──task_start──▶ Running ──task_complete (last task)──▶ Completed
//!     ▲                        │
//!     └── task_complete ◀──────┤ (more tasks to run)
//!                              ├──task_fail──▶ Failed
//!                              └──task_lost──▶ Lost
//! any non-terminal ──execution_lost──▶ Lost
//! ```
//!
//! Terminal transitions are recorded durably through [`JobOutcomes`]. The
//! in-memory state changes first, so a failed write still leaves the
//! execution terminal and the caller decides how to recover.

use batchgrid_resources::{NodeResources, TaskResources};
use batchgrid_state::{
    JobExeId, JobExecutionRecord, NODE_LOST, TASK_LOST, TaskKind, TaskResults,
};
use tracing::{debug, info, warn};

use crate::error::{ExecutionError, ExecutionResult};
use crate::outcome::JobOutcomes;
use crate::task::JobTask;

/// Lifecycle state of a running job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Waiting for the current task to launch or start.
    Scheduled,
    Running,
    Completed,
    Failed,
    Lost,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Lost)
    }
}

/// One job execution placed on an agent, with its ordered tasks.
#[derive(Debug, Clone)]
pub struct RunningJobExecution {
    id: JobExeId,
    job_type: String,
    agent_id: String,
    tasks: Vec<JobTask>,
    /// Index of the task currently being run.
    current: usize,
    state: ExecutionState,
    error: Option<String>,
    results: Vec<TaskResults>,
}

impl RunningJobExecution {
    /// Create an execution on `agent_id` running `kinds` in order.
    /// An empty task list runs a single main task.
    pub fn new(
        id: JobExeId,
        job_type: impl Into<String>,
        agent_id: impl Into<String>,
        resources: NodeResources,
        kinds: &[TaskKind],
    ) -> Self {
        let agent_id = agent_id.into();
        let kinds = if kinds.is_empty() {
            &[TaskKind::Main][..]
        } else {
            kinds
        };
        let tasks = kinds
            .iter()
            .map(|kind| JobTask::new(id, *kind, agent_id.clone(), resources.clone()))
            .collect();
        Self {
            id,
            job_type: job_type.into(),
            agent_id,
            tasks,
            current: 0,
            state: ExecutionState::Scheduled,
            error: None,
            results: Vec::new(),
        }
    }

    /// Build from a durable record that has been scheduled onto an agent.
    pub fn from_record(record: &JobExecutionRecord) -> ExecutionResult<Self> {
        let agent_id = record
            .agent_id
            .as_deref()
            .ok_or(ExecutionError::NoAgent(record.id))?;
        Ok(Self::new(
            record.id,
            record.job_type.clone(),
            agent_id,
            record.resources.clone(),
            &record.tasks,
        ))
    }

    pub fn id(&self) -> JobExeId {
        self.id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Name of the built-in error a failed or lost execution ended with.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn tasks(&self) -> &[JobTask] {
        &self.tasks
    }

    pub fn results(&self) -> &[TaskResults] {
        &self.results
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// The task that has been launched and has not ended yet.
    ///
    /// Still reported after `execution_lost`, since the agent never told
    /// us how that task ended.
    pub fn current_task(&self) -> Option<&JobTask> {
        self.tasks.get(self.current).filter(|t| t.is_active())
    }

    /// The task waiting to be handed to the cluster manager, if any.
    pub fn next_task_to_launch(&self) -> Option<&JobTask> {
        if self.state != ExecutionState::Scheduled {
            return None;
        }
        self.tasks.get(self.current).filter(|t| t.launched.is_none())
    }

    /// Resources held by the current task, for capacity accounting.
    pub fn task_resources(&self) -> Option<TaskResources> {
        self.current_task().map(|task| TaskResources {
            task_id: task.id.clone(),
            agent_id: task.agent_id.clone(),
            resources: task.resources.clone(),
        })
    }

    /// Mark the next task as handed to the cluster manager.
    pub fn task_launched(&mut self, task_id: &str, when: u64) -> ExecutionResult<()> {
        if self.next_task_to_launch().map(|t| t.id.as_str()) != Some(task_id) {
            return Err(self.unknown_task(task_id));
        }
        self.tasks[self.current].launched = Some(when);
        debug!(job_exe_id = self.id, %task_id, "task launched");
        Ok(())
    }

    /// The current task reported RUNNING.
    pub fn task_start(&mut self, task_id: &str, when: u64) -> ExecutionResult<()> {
        let task = self.current_mut(task_id)?;
        if task.launched.is_none() {
            task.launched = Some(when);
        }
        task.started = Some(when);
        self.state = ExecutionState::Running;
        debug!(job_exe_id = self.id, %task_id, "task started");
        Ok(())
    }

    /// The current task reported FINISHED.
    ///
    /// Completing the last task completes the execution; otherwise the
    /// execution goes back to waiting for its next task to launch.
    pub fn task_complete(
        &mut self,
        results: &TaskResults,
        outcomes: &JobOutcomes,
    ) -> ExecutionResult<()> {
        let task = self.current_mut(&results.task_id)?;
        task.ended = Some(results.when);
        task.exit_code = results.exit_code;
        self.results.push(results.clone());

        if self.current + 1 < self.tasks.len() {
            self.current += 1;
            self.state = ExecutionState::Scheduled;
            debug!(job_exe_id = self.id, task_id = %results.task_id, "task completed, next task pending");
            return Ok(());
        }

        self.state = ExecutionState::Completed;
        info!(job_exe_id = self.id, "job execution completed");
        outcomes
            .completions
            .handle_job_completion(self.id, results.when, &self.results)?;
        Ok(())
    }

    /// The current task reported FAILED, ERROR or KILLED.
    pub fn task_fail(
        &mut self,
        results: &TaskResults,
        error_name: &str,
        outcomes: &JobOutcomes,
    ) -> ExecutionResult<()> {
        let task = self.current_mut(&results.task_id)?;
        task.ended = Some(results.when);
        task.exit_code = results.exit_code;
        self.results.push(results.clone());

        self.finish(ExecutionState::Failed, error_name);
        warn!(job_exe_id = self.id, task_id = %results.task_id, error = %error_name, "task failed");
        outcomes.fail(self.id, results.when, &self.results, error_name)?;
        Ok(())
    }

    /// The current task reported LOST.
    pub fn task_lost(
        &mut self,
        task_id: &str,
        when: u64,
        outcomes: &JobOutcomes,
    ) -> ExecutionResult<()> {
        let task = self.current_mut(task_id)?;
        task.ended = Some(when);
        self.results.push(TaskResults::new(task_id, when));

        self.finish(ExecutionState::Lost, TASK_LOST);
        warn!(job_exe_id = self.id, %task_id, "task lost");
        outcomes.fail(self.id, when, &self.results, TASK_LOST)?;
        Ok(())
    }

    /// The execution's agent was lost, whatever its tasks last reported.
    pub fn execution_lost(&mut self, when: u64, outcomes: &JobOutcomes) -> ExecutionResult<()> {
        if self.is_finished() {
            return Ok(());
        }
        self.finish(ExecutionState::Lost, NODE_LOST);
        warn!(job_exe_id = self.id, agent_id = %self.agent_id, "job execution lost with its node");
        outcomes.fail(self.id, when, &self.results, NODE_LOST)?;
        Ok(())
    }

    fn finish(&mut self, state: ExecutionState, error_name: &str) {
        self.state = state;
        self.error = Some(error_name.to_string());
    }

    fn current_mut(&mut self, task_id: &str) -> ExecutionResult<&mut JobTask> {
        let matches = !self.is_finished()
            && self
                .tasks
                .get(self.current)
                .is_some_and(|t| t.id == task_id);
        if !matches {
            return Err(self.unknown_task(task_id));
        }
        Ok(&mut self.tasks[self.current])
    }

    fn unknown_task(&self, task_id: &str) -> ExecutionError {
        ExecutionError::UnknownTask {
            job_exe_id: self.id,
            task_id: task_id.to_string(),
        }
    }
}
