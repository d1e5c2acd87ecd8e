//! Narrow interfaces to the durable record of job outcomes.
//!
//! The state machine and the scheduler only ever see these traits; the
//! redb-backed `StateStore` implements all of them.

use std::sync::Arc;

use batchgrid_state::{
    BuiltinError, JobExeId, JobExecutionRecord, StateResult, StateStore, TaskResults,
};

/// Records a failed job execution.
pub trait JobFailureRecorder: Send + Sync {
    fn handle_job_failure(
        &self,
        job_exe_id: JobExeId,
        when: u64,
        context: &[TaskResults],
        error: &BuiltinError,
    ) -> StateResult<()>;
}

/// Records a completed job execution.
pub trait JobCompletionRecorder: Send + Sync {
    fn handle_job_completion(
        &self,
        job_exe_id: JobExeId,
        when: u64,
        results: &[TaskResults],
    ) -> StateResult<()>;
}

/// Looks up built-in error kinds by name.
pub trait BuiltinErrors: Send + Sync {
    fn get_builtin_error(&self, name: &str) -> StateResult<BuiltinError>;
}

/// Lists executions durable storage believes are running.
pub trait RunningExecutionQuery: Send + Sync {
    fn get_running_job_executions(&self) -> StateResult<Vec<JobExecutionRecord>>;
}

impl JobFailureRecorder for StateStore {
    fn handle_job_failure(
        &self,
        job_exe_id: JobExeId,
        when: u64,
        context: &[TaskResults],
        error: &BuiltinError,
    ) -> StateResult<()> {
        StateStore::handle_job_failure(self, job_exe_id, when, context, error)
    }
}

impl JobCompletionRecorder for StateStore {
    fn handle_job_completion(
        &self,
        job_exe_id: JobExeId,
        when: u64,
        results: &[TaskResults],
    ) -> StateResult<()> {
        StateStore::handle_job_completion(self, job_exe_id, when, results)
    }
}

impl BuiltinErrors for StateStore {
    fn get_builtin_error(&self, name: &str) -> StateResult<BuiltinError> {
        StateStore::get_builtin_error(self, name)
    }
}

impl RunningExecutionQuery for StateStore {
    fn get_running_job_executions(&self) -> StateResult<Vec<JobExecutionRecord>> {
        StateStore::get_running_job_executions(self)
    }
}

/// The outcome collaborators a running execution reports to.
#[derive(Clone)]
pub struct JobOutcomes {
    pub failures: Arc<dyn JobFailureRecorder>,
    pub completions: Arc<dyn JobCompletionRecorder>,
    pub errors: Arc<dyn BuiltinErrors>,
    pub running: Arc<dyn RunningExecutionQuery>,
}

impl JobOutcomes {
    /// Route every outcome through one state store.
    pub fn from_store(store: StateStore) -> Self {
        let store = Arc::new(store);
        Self {
            failures: store.clone(),
            completions: store.clone(),
            errors: store.clone(),
            running: store,
        }
    }

    /// Look up a built-in error and record the execution as failed with it.
    pub fn fail(
        &self,
        job_exe_id: JobExeId,
        when: u64,
        context: &[TaskResults],
        error_name: &str,
    ) -> StateResult<()> {
        let error = self.errors.get_builtin_error(error_name)?;
        self.failures
            .handle_job_failure(job_exe_id, when, context, &error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchgrid_resources::NodeResources;
    use batchgrid_state::{ExecutionStatus, NewJob, SCHEDULER_LOST, TaskKind};

    #[test]
    fn store_backed_outcomes_fail_execution() {
        let store = StateStore::open_in_memory().unwrap();
        store.initialize_system().unwrap();
        let id = store
            .queue_job(
                NewJob {
                    job_type: "a".into(),
                    priority: 1,
                    resources: NodeResources::from_scalars(1.0, 64.0, 0.0),
                    tasks: vec![TaskKind::Main],
                },
                100,
            )
            .unwrap();
        store.schedule_queued_job(id, "agent-1", 110).unwrap();

        let outcomes = JobOutcomes::from_store(store.clone());
        assert_eq!(outcomes.running.get_running_job_executions().unwrap().len(), 1);

        outcomes.fail(id, 120, &[], SCHEDULER_LOST).unwrap();
        let record = store.get_job_execution(id).unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error.as_deref(), Some(SCHEDULER_LOST));
    }

    #[test]
    fn unknown_error_name_is_an_error() {
        let store = StateStore::open_in_memory().unwrap();
        store.initialize_system().unwrap();
        let outcomes = JobOutcomes::from_store(store);
        assert!(outcomes.fail(1, 100, &[], "no-such-error").is_err());
    }
}
