//! Shared fixtures: recording collaborators and controller builders.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use batchgrid_execution::{
    BuiltinErrors, JobCompletionRecorder, JobFailureRecorder, JobOutcomes, RunningExecutionQuery,
    RunningJobExecution,
};
use batchgrid_resources::NodeResources;
use batchgrid_scheduler::{
    CleanupQueue, Offer, Resource, SchedulerConfig, SchedulerDriver, SchedulerEventController,
    TaskSpec,
};
use batchgrid_state::{
    BuiltinError, JobExeId, JobExecutionRecord, StateError, StateResult, StateStore, TaskKind,
    TaskResults, builtin_errors,
};

/// One call to `handle_job_failure`.
#[derive(Debug, Clone)]
pub struct RecordedFailure {
    pub job_exe_id: JobExeId,
    pub when: u64,
    pub context: Vec<TaskResults>,
    pub error: String,
}

/// Outcome collaborators that record every call and can be told to fail
/// the durable write for chosen executions.
#[derive(Default)]
pub struct MockOutcomes {
    pub failures: Mutex<Vec<RecordedFailure>>,
    pub completions: Mutex<Vec<(JobExeId, Vec<TaskResults>)>>,
    pub failing_writes: Mutex<HashSet<JobExeId>>,
    pub running: Mutex<Vec<JobExecutionRecord>>,
}

impl MockOutcomes {
    pub fn fail_writes_for(&self, job_exe_id: JobExeId) {
        self.failing_writes.lock().unwrap().insert(job_exe_id);
    }

    pub fn failures(&self) -> Vec<RecordedFailure> {
        self.failures.lock().unwrap().clone()
    }

    pub fn completions(&self) -> Vec<(JobExeId, Vec<TaskResults>)> {
        self.completions.lock().unwrap().clone()
    }

    fn check_write(&self, job_exe_id: JobExeId) -> StateResult<()> {
        if self.failing_writes.lock().unwrap().contains(&job_exe_id) {
            return Err(StateError::Write("disk full".to_string()));
        }
        Ok(())
    }
}

impl JobFailureRecorder for MockOutcomes {
    fn handle_job_failure(
        &self,
        job_exe_id: JobExeId,
        when: u64,
        context: &[TaskResults],
        error: &BuiltinError,
    ) -> StateResult<()> {
        self.failures.lock().unwrap().push(RecordedFailure {
            job_exe_id,
            when,
            context: context.to_vec(),
            error: error.name.clone(),
        });
        self.check_write(job_exe_id)
    }
}

impl JobCompletionRecorder for MockOutcomes {
    fn handle_job_completion(
        &self,
        job_exe_id: JobExeId,
        _when: u64,
        results: &[TaskResults],
    ) -> StateResult<()> {
        self.completions
            .lock()
            .unwrap()
            .push((job_exe_id, results.to_vec()));
        self.check_write(job_exe_id)
    }
}

impl BuiltinErrors for MockOutcomes {
    fn get_builtin_error(&self, name: &str) -> StateResult<BuiltinError> {
        builtin_errors()
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| StateError::NotFound(name.to_string()))
    }
}

impl RunningExecutionQuery for MockOutcomes {
    fn get_running_job_executions(&self) -> StateResult<Vec<JobExecutionRecord>> {
        Ok(self.running.lock().unwrap().clone())
    }
}

pub fn outcomes(mock: &Arc<MockOutcomes>) -> JobOutcomes {
    JobOutcomes {
        failures: mock.clone(),
        completions: mock.clone(),
        errors: mock.clone(),
        running: mock.clone(),
    }
}

/// Driver that records every request and can be told to refuse launches.
#[derive(Default)]
pub struct MockDriver {
    pub launches: Mutex<Vec<(Vec<String>, Vec<TaskSpec>)>>,
    pub reconciles: Mutex<Vec<Vec<String>>>,
    pub refuse_launches: AtomicBool,
}

impl MockDriver {
    pub fn launched_task_ids(&self) -> Vec<String> {
        self.launches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, tasks)| tasks.iter().map(|t| t.task_id.clone()))
            .collect()
    }
}

impl SchedulerDriver for MockDriver {
    fn launch_tasks(&self, offer_ids: &[String], tasks: Vec<TaskSpec>) -> anyhow::Result<()> {
        if self.refuse_launches.load(Ordering::SeqCst) {
            anyhow::bail!("master unreachable");
        }
        self.launches
            .lock()
            .unwrap()
            .push((offer_ids.to_vec(), tasks));
        Ok(())
    }

    fn reconcile_tasks(&self, task_ids: &[String]) -> anyhow::Result<()> {
        self.reconciles.lock().unwrap().push(task_ids.to_vec());
        Ok(())
    }
}

/// A controller whose outcomes go to `mock` and whose cleanup goes to the returned queue.
pub fn mock_controller(mock: &Arc<MockOutcomes>) -> (SchedulerEventController, Arc<CleanupQueue>) {
    let cleanup = Arc::new(CleanupQueue::new());
    let store = StateStore::open_in_memory().unwrap();
    let controller = SchedulerEventController::new(SchedulerConfig::default(), store)
        .with_outcomes(outcomes(mock))
        .with_cleanup(cleanup.clone());
    (controller, cleanup)
}

pub fn offer(id: &str, agent_id: &str, cpus: f64, mem: f64, disk: f64) -> Offer {
    Offer {
        id: id.to_string(),
        agent_id: agent_id.to_string(),
        hostname: format!("{agent_id}.cluster.local"),
        resources: vec![
            Resource::new("cpus", cpus),
            Resource::new("mem", mem),
            Resource::new("disk", disk),
        ],
    }
}

/// Register a single-task execution on `agent_id` whose task is running.
/// Returns the task ID.
pub fn running_execution(
    controller: &SchedulerEventController,
    job_exe_id: JobExeId,
    agent_id: &str,
) -> String {
    let shared = controller.executions().add(RunningJobExecution::new(
        job_exe_id,
        "convert",
        agent_id,
        NodeResources::from_scalars(2.0, 512.0, 0.0),
        &[TaskKind::Main],
    ));
    let mut execution = shared.lock().unwrap();
    let task_id = execution.next_task_to_launch().unwrap().id.clone();
    execution.task_launched(&task_id, 100).unwrap();
    execution.task_start(&task_id, 101).unwrap();
    task_id
}
