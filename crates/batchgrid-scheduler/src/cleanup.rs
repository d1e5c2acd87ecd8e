//! Cleanup collaborator.
//!
//! Finished executions are handed here so their agent can be cleaned,
//! and status updates for cleanup tasks are routed here instead of to the
//! execution registry. Running the cleanup tasks is someone else's job;
//! [`CleanupQueue`] only keeps the bookkeeping.

use std::collections::VecDeque;
use std::sync::Mutex;

use batchgrid_execution::RunningJobExecution;
use batchgrid_state::JobExeId;
use tracing::{debug, info, warn};

use crate::event::TaskStatus;

/// Default cap on executions held for cleanup across all agents.
pub const DEFAULT_CLEANUP_LIMIT: usize = 1_000;

pub trait CleanupManager: Send + Sync {
    /// Take ownership of an execution that reached a terminal state.
    fn add_job_execution(&self, execution: RunningJobExecution);

    /// Receive a status update for a cleanup task.
    fn handle_task_update(&self, status: &TaskStatus);
}

/// Finished executions awaiting cleanup, oldest first.
///
/// Holds at most `limit` entries; once full the oldest entry is dropped.
pub struct CleanupQueue {
    pending: Mutex<VecDeque<(String, JobExeId)>>,
    limit: usize,
}

impl CleanupQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            limit: DEFAULT_CLEANUP_LIMIT,
        }
    }

    /// Set the maximum number of pending executions. Zero is treated as one.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Executions awaiting cleanup on one agent, in arrival order.
    pub fn pending_for(&self, agent_id: &str) -> Vec<JobExeId> {
        self.pending
            .lock()
            .expect("cleanup lock")
            .iter()
            .filter(|(agent, _)| agent == agent_id)
            .map(|(_, id)| *id)
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("cleanup lock").len()
    }
}

impl Default for CleanupQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupManager for CleanupQueue {
    fn add_job_execution(&self, execution: RunningJobExecution) {
        debug!(
            job_exe_id = execution.id(),
            agent_id = %execution.agent_id(),
            state = ?execution.state(),
            "execution queued for cleanup"
        );
        let mut pending = self.pending.lock().expect("cleanup lock");
        pending.push_back((execution.agent_id().to_string(), execution.id()));
        while pending.len() > self.limit {
            if let Some((agent_id, job_exe_id)) = pending.pop_front() {
                warn!(%agent_id, job_exe_id, limit = self.limit, "cleanup queue full, dropping oldest execution");
            }
        }
    }

    fn handle_task_update(&self, status: &TaskStatus) {
        if !status.state.is_terminal() {
            debug!(task_id = %status.task_id, state = %status.state, "cleanup task update");
            return;
        }
        let cleared = {
            let mut pending = self.pending.lock().expect("cleanup lock");
            let before = pending.len();
            pending.retain(|(agent, _)| *agent != status.agent_id);
            before - pending.len()
        };
        match status.state {
            batchgrid_state::TaskState::Finished => {
                info!(agent_id = %status.agent_id, cleared, "agent cleanup finished");
            }
            state => {
                warn!(agent_id = %status.agent_id, %state, cleared, "agent cleanup did not finish");
            }
        }
    }
}
