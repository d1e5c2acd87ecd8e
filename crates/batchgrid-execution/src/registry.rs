//! `RunningExecutionRegistry` — in-memory index of active job executions.
//!
//! The single source of truth for whether the scheduler knows a task.
//! Each execution sits behind its own lock so callbacks for different
//! executions never contend; the registry lock only guards the index and
//! is always released before any execution lock is taken.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use batchgrid_resources::TaskResources;
use batchgrid_state::JobExeId;
use tracing::debug;

use crate::execution::RunningJobExecution;

/// A registered execution, lockable independently of the registry.
pub type SharedExecution = Arc<Mutex<RunningJobExecution>>;

/// Index of running executions by ID.
pub struct RunningExecutionRegistry {
    executions: Mutex<HashMap<JobExeId, SharedExecution>>,
}

impl RunningExecutionRegistry {
    pub fn new() -> Self {
        Self {
            executions: Mutex::new(HashMap::new()),
        }
    }

    /// Register an execution, replacing any previous one with the same ID.
    pub fn add(&self, execution: RunningJobExecution) -> SharedExecution {
        let id = execution.id();
        let agent_id = execution.agent_id().to_string();
        let shared = Arc::new(Mutex::new(execution));
        self.executions
            .lock()
            .expect("executions lock")
            .insert(id, shared.clone());
        debug!(job_exe_id = id, %agent_id, "execution registered");
        shared
    }

    pub fn get_execution(&self, job_exe_id: JobExeId) -> Option<SharedExecution> {
        self.executions
            .lock()
            .expect("executions lock")
            .get(&job_exe_id)
            .cloned()
    }

    /// Executions placed on `agent_id`, ordered by ID.
    pub fn get_executions_on_node(&self, agent_id: &str) -> Vec<SharedExecution> {
        let mut on_node: Vec<(JobExeId, SharedExecution)> = self
            .snapshot()
            .into_iter()
            .filter(|(_, exe)| exe.lock().expect("execution lock").agent_id() == agent_id)
            .collect();
        on_node.sort_by_key(|(id, _)| *id);
        on_node.into_iter().map(|(_, exe)| exe).collect()
    }

    pub fn remove_execution(&self, job_exe_id: JobExeId) -> Option<SharedExecution> {
        let removed = self
            .executions
            .lock()
            .expect("executions lock")
            .remove(&job_exe_id);
        if removed.is_some() {
            debug!(job_exe_id, "execution removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.executions.lock().expect("executions lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resources held by every launched, unfinished task.
    pub fn task_resources(&self) -> Vec<TaskResources> {
        self.snapshot()
            .into_iter()
            .filter_map(|(_, exe)| exe.lock().expect("execution lock").task_resources())
            .collect()
    }

    /// Executions whose next task is waiting to launch, ordered by ID.
    pub fn executions_awaiting_launch(&self) -> Vec<SharedExecution> {
        let mut waiting: Vec<(JobExeId, SharedExecution)> = self
            .snapshot()
            .into_iter()
            .filter(|(_, exe)| {
                exe.lock()
                    .expect("execution lock")
                    .next_task_to_launch()
                    .is_some()
            })
            .collect();
        waiting.sort_by_key(|(id, _)| *id);
        waiting.into_iter().map(|(_, exe)| exe).collect()
    }

    fn snapshot(&self) -> Vec<(JobExeId, SharedExecution)> {
        self.executions
            .lock()
            .expect("executions lock")
            .iter()
            .map(|(id, exe)| (*id, exe.clone()))
            .collect()
    }
}

impl Default for RunningExecutionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchgrid_resources::NodeResources;
    use batchgrid_state::TaskKind;

    fn exe(id: JobExeId, agent_id: &str) -> RunningJobExecution {
        RunningJobExecution::new(
            id,
            "job",
            agent_id,
            NodeResources::from_scalars(1.0, 64.0, 0.0),
            &[TaskKind::Main],
        )
    }

    #[test]
    fn add_get_remove() {
        let registry = RunningExecutionRegistry::new();
        registry.add(exe(1, "agent-1"));
        assert!(registry.get_execution(1).is_some());
        assert_eq!(
            registry.get_execution(1).unwrap().lock().unwrap().agent_id(),
            "agent-1"
        );

        assert!(registry.remove_execution(1).is_some());
        assert!(registry.remove_execution(1).is_none());
        assert!(registry.get_execution(1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn executions_on_node_are_filtered_and_ordered() {
        let registry = RunningExecutionRegistry::new();
        registry.add(exe(3, "agent-1"));
        registry.add(exe(1, "agent-1"));
        registry.add(exe(2, "agent-2"));

        let ids: Vec<JobExeId> = registry
            .get_executions_on_node("agent-1")
            .iter()
            .map(|e| e.lock().unwrap().id())
            .collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(registry.get_executions_on_node("agent-9").is_empty());
    }

    #[test]
    fn only_launched_tasks_hold_resources() {
        let registry = RunningExecutionRegistry::new();
        let launched = registry.add(exe(1, "agent-1"));
        registry.add(exe(2, "agent-1"));
        launched.lock().unwrap().task_launched("1_main", 100).unwrap();

        let tasks = registry.task_resources();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_id, "1_main");
        assert_eq!(tasks[0].agent_id, "agent-1");

        let waiting: Vec<JobExeId> = registry
            .executions_awaiting_launch()
            .iter()
            .map(|e| e.lock().unwrap().id())
            .collect();
        assert_eq!(waiting, vec![2]);
    }
}
