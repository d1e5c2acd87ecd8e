//! StateStore — redb-backed state persistence for BatchGrid.
//!
//! Provides typed operations over job executions, the job queue, built-in
//! errors, the task update log, and the scheduler record. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const SCHEDULER_KEY: &str = "scheduler";
const TASK_UPDATE_SEQ_KEY: &str = "task_update_seq";

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(JOB_EXECUTIONS).map_err(map_err!(Table))?;
        txn.open_table(JOB_QUEUE).map_err(map_err!(Table))?;
        txn.open_table(BUILTIN_ERRORS).map_err(map_err!(Table))?;
        txn.open_table(TASK_UPDATES).map_err(map_err!(Table))?;
        txn.open_table(SCHEDULER).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── System ─────────────────────────────────────────────────────

    /// Seed the built-in error kinds. Safe to call on every registration.
    pub fn initialize_system(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut seeded = 0;
        {
            let mut table = txn.open_table(BUILTIN_ERRORS).map_err(map_err!(Table))?;
            for error in builtin_errors() {
                let exists = table
                    .get(error.name.as_str())
                    .map_err(map_err!(Read))?
                    .is_some();
                if !exists {
                    let value = serde_json::to_vec(&error).map_err(map_err!(Serialize))?;
                    table
                        .insert(error.name.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    seeded += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(seeded, "system initialized");
        Ok(())
    }

    /// Look up a built-in error kind by name.
    pub fn get_builtin_error(&self, name: &str) -> StateResult<BuiltinError> {
        self.get_json(BUILTIN_ERRORS, name)?
            .ok_or_else(|| StateError::NotFound(format!("builtin error {name}")))
    }

    /// Record the master the scheduler is registered with.
    ///
    /// A `None` framework ID keeps the one already stored.
    pub fn update_master(
        &self,
        framework_id: Option<&str>,
        hostname: &str,
        port: u16,
        when: u64,
    ) -> StateResult<()> {
        let existing: Option<SchedulerRecord> = self.get_json(SCHEDULER, SCHEDULER_KEY)?;
        let framework_id = framework_id
            .map(str::to_string)
            .or_else(|| existing.and_then(|r| r.framework_id));
        let record = SchedulerRecord {
            framework_id,
            master_hostname: hostname.to_string(),
            master_port: port,
            updated_at: when,
        };
        self.put_json(SCHEDULER, SCHEDULER_KEY, &record)?;
        debug!(%hostname, port, "master recorded");
        Ok(())
    }

    /// The stored scheduler record, if the scheduler ever registered.
    pub fn get_scheduler_record(&self) -> StateResult<Option<SchedulerRecord>> {
        self.get_json(SCHEDULER, SCHEDULER_KEY)
    }

    // ── Queue ──────────────────────────────────────────────────────

    /// Queue a new job, allocating its execution ID.
    pub fn queue_job(&self, job: NewJob, when: u64) -> StateResult<JobExeId> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let id;
        {
            let mut executions = txn.open_table(JOB_EXECUTIONS).map_err(map_err!(Table))?;
            id = match executions.last().map_err(map_err!(Read))? {
                Some((key, _)) => key.value().parse::<JobExeId>().unwrap_or(0) + 1,
                None => 1,
            };

            let record = JobExecutionRecord {
                id,
                job_type: job.job_type.clone(),
                status: ExecutionStatus::Queued,
                agent_id: None,
                priority: job.priority,
                resources: job.resources.clone(),
                tasks: job.tasks.clone(),
                queued_at: when,
                started_at: None,
                ended_at: None,
                error: None,
                task_results: Vec::new(),
            };
            let key = job_exe_key(id);
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            executions
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            let queued = QueuedJob {
                job_exe_id: id,
                job_type: job.job_type,
                priority: job.priority,
                resources: job.resources,
                tasks: job.tasks,
                queued_at: when,
            };
            let value = serde_json::to_vec(&queued).map_err(map_err!(Serialize))?;
            let mut queue = txn.open_table(JOB_QUEUE).map_err(map_err!(Table))?;
            queue
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(job_exe_id = id, "job queued");
        Ok(id)
    }

    /// Queued jobs in scheduling order: priority, then queue time, then ID.
    pub fn list_queued_jobs(&self, limit: usize) -> StateResult<Vec<QueuedJob>> {
        let mut jobs: Vec<QueuedJob> = self.list_json(JOB_QUEUE, "")?;
        jobs.sort_by_key(|j| (j.priority, j.queued_at, j.job_exe_id));
        jobs.truncate(limit);
        Ok(jobs)
    }

    /// Move a queued job onto an agent: dequeue it and mark its execution running.
    pub fn schedule_queued_job(
        &self,
        job_exe_id: JobExeId,
        agent_id: &str,
        when: u64,
    ) -> StateResult<JobExecutionRecord> {
        let key = job_exe_key(job_exe_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let record;
        {
            let mut queue = txn.open_table(JOB_QUEUE).map_err(map_err!(Table))?;
            let was_queued = queue
                .remove(key.as_str())
                .map_err(map_err!(Write))?
                .is_some();
            if !was_queued {
                return Err(StateError::QueueConflict(job_exe_id));
            }

            let mut executions = txn.open_table(JOB_EXECUTIONS).map_err(map_err!(Table))?;
            let existing: Option<JobExecutionRecord> =
                match executions.get(key.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => {
                        Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                    }
                    None => None,
                };
            let mut updated = existing.ok_or(StateError::UnknownExecution(job_exe_id))?;
            updated.status = ExecutionStatus::Running;
            updated.agent_id = Some(agent_id.to_string());
            updated.started_at = Some(when);

            let value = serde_json::to_vec(&updated).map_err(map_err!(Serialize))?;
            executions
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            record = updated;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(job_exe_id, %agent_id, "queued job scheduled");
        Ok(record)
    }

    // ── Job executions ─────────────────────────────────────────────

    /// Get a job execution by ID.
    pub fn get_job_execution(&self, job_exe_id: JobExeId) -> StateResult<Option<JobExecutionRecord>> {
        self.get_json(JOB_EXECUTIONS, &job_exe_key(job_exe_id))
    }

    /// Every execution currently marked running.
    pub fn get_running_job_executions(&self) -> StateResult<Vec<JobExecutionRecord>> {
        let all: Vec<JobExecutionRecord> = self.list_json(JOB_EXECUTIONS, "")?;
        Ok(all
            .into_iter()
            .filter(|r| r.status == ExecutionStatus::Running)
            .collect())
    }

    /// Fail a job execution with a built-in error.
    ///
    /// Missing and already-terminal executions are left untouched, so
    /// repeated failure reports for the same execution are harmless.
    pub fn handle_job_failure(
        &self,
        job_exe_id: JobExeId,
        when: u64,
        context: &[TaskResults],
        error: &BuiltinError,
    ) -> StateResult<()> {
        let applied = self.finish_execution(job_exe_id, |record| {
            record.status = ExecutionStatus::Failed;
            record.error = Some(error.name.clone());
            record.ended_at = Some(when);
            record.task_results.extend(context.iter().cloned());
        })?;
        if applied {
            info!(job_exe_id, error = %error.name, "job execution failed");
        }
        Ok(())
    }

    /// Mark a job execution completed. Missing and terminal executions are left untouched.
    pub fn handle_job_completion(
        &self,
        job_exe_id: JobExeId,
        when: u64,
        results: &[TaskResults],
    ) -> StateResult<()> {
        let applied = self.finish_execution(job_exe_id, |record| {
            record.status = ExecutionStatus::Completed;
            record.ended_at = Some(when);
            record.task_results.extend(results.iter().cloned());
        })?;
        if applied {
            info!(job_exe_id, "job execution completed");
        }
        Ok(())
    }

    /// Apply a terminal transition inside one write transaction.
    /// Returns false if the execution was missing or already terminal.
    fn finish_execution(
        &self,
        job_exe_id: JobExeId,
        apply: impl FnOnce(&mut JobExecutionRecord),
    ) -> StateResult<bool> {
        let key = job_exe_key(job_exe_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let applied;
        {
            let mut executions = txn.open_table(JOB_EXECUTIONS).map_err(map_err!(Table))?;
            let existing: Option<JobExecutionRecord> =
                match executions.get(key.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => {
                        Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                    }
                    None => None,
                };

            match existing {
                Some(mut record) if !record.status.is_terminal() => {
                    apply(&mut record);
                    let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                    executions
                        .insert(key.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    let mut queue = txn.open_table(JOB_QUEUE).map_err(map_err!(Table))?;
                    queue.remove(key.as_str()).map_err(map_err!(Write))?;
                    applied = true;
                }
                Some(record) => {
                    debug!(job_exe_id, status = ?record.status, "execution already terminal");
                    applied = false;
                }
                None => {
                    warn!(job_exe_id, "no such job execution");
                    applied = false;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(applied)
    }

    // ── Task updates ───────────────────────────────────────────────

    /// Append task status updates to the durable log.
    pub fn append_task_updates(&self, updates: &[TaskUpdate]) -> StateResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut scheduler = txn.open_table(SCHEDULER).map_err(map_err!(Table))?;
            let mut seq: u64 = match scheduler.get(TASK_UPDATE_SEQ_KEY).map_err(map_err!(Read))? {
                Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                None => 0,
            };

            let mut table = txn.open_table(TASK_UPDATES).map_err(map_err!(Table))?;
            for update in updates {
                seq += 1;
                let key = format!("{}:{seq:020}", update.task_id);
                let value = serde_json::to_vec(update).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }

            let value = serde_json::to_vec(&seq).map_err(map_err!(Serialize))?;
            scheduler
                .insert(TASK_UPDATE_SEQ_KEY, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count = updates.len(), "task updates stored");
        Ok(())
    }

    /// Every stored update for a task, oldest first.
    pub fn list_task_updates(&self, task_id: &str) -> StateResult<Vec<TaskUpdate>> {
        self.list_json(TASK_UPDATES, &format!("{task_id}:"))
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn get_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn list_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        prefix: &str,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let item = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(item);
            }
        }
        Ok(results)
    }
}
