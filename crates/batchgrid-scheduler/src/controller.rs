//! `SchedulerEventController` — turns cluster-manager callbacks into state transitions.
//!
//! ```text
//! Unregistered ──registered──▶ Registered ──disconnected──▶ Disconnected
//!                                  ▲                            │
//!                                  └────────reregistered────────┘
//! any ──shutdown──▶ Shutdown
//! ```
//!
//! Callbacks never return errors. Anything that goes wrong while applying a
//! status update or an agent loss is logged and the affected task ID goes
//! to the reconciliation tracker, which keeps probing until a status
//! update settles it.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use batchgrid_execution::{
    ExecutionError, JobOutcomes, RunningExecutionRegistry, SharedExecution, parse_task_id,
};
use batchgrid_resources::{ResourceManager, ResourceOffer};
use batchgrid_state::{JobExeId, SCHEDULER_LOST, StateStore, TASK_FAILED, TaskResults, TaskState};

use crate::cleanup::{CleanupManager, CleanupQueue};
use crate::config::SchedulerConfig;
use crate::driver::{DriverHandle, SchedulerDriver};
use crate::error::SchedulerResult;
use crate::event::{MasterInfo, Offer, SchedulerEvent, TaskStatus};
use crate::node::NodeManager;
use crate::recon::ReconciliationTracker;
use crate::report::{ControllerState, ExecutionCounts, NodeStatus, SchedulerStatus};
use crate::sync::{CacheSync, sync_all};
use crate::timing::{CallbackTimer, epoch_secs};
use crate::updates::TaskUpdateQueue;
use crate::workers::{DbSyncWorker, ReconciliationWorker, SchedulingWorker, StatusUpdateWorker};

struct Session {
    state: ControllerState,
    framework_id: Option<String>,
    master: Option<MasterInfo>,
}

/// The scheduler's top-level context: owns every manager and dispatches
/// cluster-manager events to them.
pub struct SchedulerEventController {
    config: SchedulerConfig,
    store: StateStore,
    outcomes: JobOutcomes,
    driver: DriverHandle,
    resources: Arc<ResourceManager>,
    nodes: Arc<NodeManager>,
    executions: Arc<RunningExecutionRegistry>,
    recon: Arc<ReconciliationTracker>,
    cleanup: Arc<dyn CleanupManager>,
    updates: Arc<TaskUpdateQueue>,
    syncs: Vec<Arc<dyn CacheSync>>,
    /// Shared with the scheduling worker so orphan detection never sees a
    /// job that is durably running but not yet registered in memory.
    scheduling: Arc<Mutex<()>>,
    session: Mutex<Session>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerEventController {
    /// Create a controller whose outcomes are recorded in `store`.
    pub fn new(config: SchedulerConfig, store: StateStore) -> Self {
        let resources =
            ResourceManager::new().with_watermark_period(config.watermark_reset_period());
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            outcomes: JobOutcomes::from_store(store.clone()),
            store,
            driver: DriverHandle::new(),
            resources: Arc::new(resources),
            nodes: Arc::new(NodeManager::new()),
            executions: Arc::new(RunningExecutionRegistry::new()),
            recon: Arc::new(ReconciliationTracker::new()),
            cleanup: Arc::new(CleanupQueue::new().with_limit(config.cleanup_queue_limit)),
            updates: Arc::new(TaskUpdateQueue::new()),
            syncs: Vec::new(),
            scheduling: Arc::new(Mutex::new(())),
            session: Mutex::new(Session {
                state: ControllerState::Unregistered,
                framework_id: None,
                master: None,
            }),
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Record outcomes somewhere other than the store.
    pub fn with_outcomes(mut self, outcomes: JobOutcomes) -> Self {
        self.outcomes = outcomes;
        self
    }

    pub fn with_cleanup(mut self, cleanup: Arc<dyn CleanupManager>) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Register a cache synced on registration and by the db sync worker.
    pub fn with_cache_sync(mut self, sync: Arc<dyn CacheSync>) -> Self {
        self.syncs.push(sync);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    pub fn nodes(&self) -> &Arc<NodeManager> {
        &self.nodes
    }

    pub fn executions(&self) -> &Arc<RunningExecutionRegistry> {
        &self.executions
    }

    pub fn recon(&self) -> &Arc<ReconciliationTracker> {
        &self.recon
    }

    pub fn updates(&self) -> &Arc<TaskUpdateQueue> {
        &self.updates
    }

    pub fn driver(&self) -> &DriverHandle {
        &self.driver
    }

    pub fn state(&self) -> ControllerState {
        self.session.lock().expect("session lock").state
    }

    /// Dispatch one cluster-manager event to its callback.
    pub fn handle(&self, event: SchedulerEvent) {
        debug!(event = event.name(), "scheduler event");
        match event {
            SchedulerEvent::Registered {
                driver,
                framework_id,
                master,
            } => self.registered(driver, &framework_id, master),
            SchedulerEvent::Reregistered { driver, master } => self.reregistered(driver, master),
            SchedulerEvent::Disconnected => self.disconnected(),
            SchedulerEvent::ResourceOffers(offers) => self.resource_offers(offers),
            SchedulerEvent::OfferRescinded(offer_id) => self.offer_rescinded(&offer_id),
            SchedulerEvent::StatusUpdate(status) => self.status_update(status),
            SchedulerEvent::FrameworkMessage {
                executor_id,
                agent_id,
                data,
            } => self.framework_message(&executor_id, &agent_id, &data),
            SchedulerEvent::AgentLost(agent_id) => self.agent_lost(&agent_id),
            SchedulerEvent::ExecutorLost {
                executor_id,
                agent_id,
                status,
            } => self.executor_lost(&executor_id, &agent_id, status),
            SchedulerEvent::Error(message) => self.error(&message),
        }
    }

    // ── Registration ───────────────────────────────────────────────

    pub fn registered(
        &self,
        driver: Arc<dyn SchedulerDriver>,
        framework_id: &str,
        master: MasterInfo,
    ) {
        let _timer = CallbackTimer::start("registered", self.config.db_threshold());
        info!(%framework_id, %master, "scheduler registered");

        self.driver.set(driver);
        self.record_master(Some(framework_id), master);

        if let Err(e) = self.store.initialize_system() {
            error!(error = %e, "system initialization failed");
        }
        let synced = sync_all(&self.syncs);
        debug!(synced, total = self.syncs.len(), "caches synced");

        self.start_workers();
        self.reconcile_running_jobs();
    }

    pub fn reregistered(&self, driver: Arc<dyn SchedulerDriver>, master: MasterInfo) {
        let _timer = CallbackTimer::start("reregistered", self.config.db_threshold());
        info!(%master, "scheduler re-registered");

        // Workers read the driver through the shared handle.
        self.driver.set(driver);
        self.record_master(None, master);
        self.reconcile_running_jobs();
    }

    pub fn disconnected(&self) {
        let _timer = CallbackTimer::start("disconnected", self.config.in_memory_threshold());
        let mut session = self.session.lock().expect("session lock");
        if session.state == ControllerState::Registered {
            session.state = ControllerState::Disconnected;
        }
        match &session.master {
            Some(master) => warn!(%master, "scheduler disconnected from master"),
            None => warn!("scheduler disconnected"),
        }
    }

    fn record_master(&self, framework_id: Option<&str>, master: MasterInfo) {
        if let Err(e) =
            self.store
                .update_master(framework_id, &master.hostname, master.port, epoch_secs())
        {
            error!(error = %e, %master, "failed to record master");
        }
        let mut session = self.session.lock().expect("session lock");
        if session.state != ControllerState::Shutdown {
            session.state = ControllerState::Registered;
        }
        if let Some(framework_id) = framework_id {
            session.framework_id = Some(framework_id.to_string());
        }
        session.master = Some(master);
    }

    /// Settle executions storage says are running: ones this scheduler is
    /// tracking get their current task reconciled, ones it has never heard
    /// of are failed with `scheduler-lost`. Returns how many were failed.
    pub fn reconcile_running_jobs(&self) -> usize {
        let _guard = self.scheduling.lock().expect("scheduling lock");
        let running = match self.outcomes.running.get_running_job_executions() {
            Ok(running) => running,
            Err(e) => {
                error!(error = %e, "could not query running executions");
                return 0;
            }
        };

        let when = epoch_secs();
        let mut failed = 0;
        let mut recon_ids = Vec::new();
        for record in running {
            match self.executions.get_execution(record.id) {
                Some(shared) => {
                    if let Some(task) = shared.lock().expect("execution lock").current_task() {
                        recon_ids.push(task.id.clone());
                    }
                }
                None => match self.outcomes.fail(record.id, when, &[], SCHEDULER_LOST) {
                    Ok(()) => {
                        warn!(job_exe_id = record.id, "running execution unknown to scheduler, failed");
                        failed += 1;
                    }
                    Err(e) => error!(job_exe_id = record.id, error = %e, "failed to fail lost execution"),
                },
            }
        }
        info!(failed, reconciling = recon_ids.len(), "running executions reconciled");
        self.recon.add_task_ids(recon_ids);
        failed
    }

    // ── Offers ─────────────────────────────────────────────────────

    pub fn resource_offers(&self, offers: Vec<Offer>) {
        let _timer = CallbackTimer::start("resource_offers", self.config.in_memory_threshold());

        let agent_ids: Vec<String> = offers
            .iter()
            .map(|o| o.agent_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.nodes.register_agent_ids(&agent_ids);
        for offer in &offers {
            self.nodes.set_hostname(&offer.agent_id, &offer.hostname);
        }

        let count = offers.len();
        let offers: Vec<ResourceOffer> = offers
            .into_iter()
            .map(|o| {
                let resources = o.node_resources();
                ResourceOffer::new(o.id, o.agent_id, resources)
            })
            .collect();
        self.resources.add_new_offers(offers);
        debug!(offers = count, agents = agent_ids.len(), "resource offers received");
    }

    pub fn offer_rescinded(&self, offer_id: &str) {
        let _timer = CallbackTimer::start("offer_rescinded", self.config.in_memory_threshold());
        self.resources.remove_offers(&[offer_id.to_string()]);
        debug!(%offer_id, "offer rescinded");
    }

    // ── Task status ────────────────────────────────────────────────

    pub fn status_update(&self, status: TaskStatus) {
        let _timer = CallbackTimer::start("status_update", self.config.db_threshold());
        let task_id = status.task_id.clone();
        debug!(%task_id, state = %status.state, agent_id = %status.agent_id, "status update");

        // Any update proves the task's state is known again.
        self.recon.remove_task_id(&task_id);

        if task_id.starts_with(&self.config.cleanup_prefix) {
            self.cleanup.handle_task_update(&status);
            return;
        }

        self.updates.push(status.to_update());
        if let Err(e) = self.apply_task_status(&status) {
            error!(%task_id, error = %e, "status update failed, task will be reconciled");
            self.recon.add_task_ids([task_id]);
        }
    }

    fn apply_task_status(&self, status: &TaskStatus) -> SchedulerResult<()> {
        let (job_exe_id, _) = match parse_task_id(&status.task_id) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(task_id = %status.task_id, error = %e, "status update for unrecognized task");
                return Ok(());
            }
        };

        let Some(shared) = self.executions.get_execution(job_exe_id) else {
            warn!(
                %job_exe_id,
                task_id = %status.task_id,
                "status update for unknown execution, failing it"
            );
            self.outcomes
                .fail(job_exe_id, status.timestamp, &[], SCHEDULER_LOST)?;
            return Ok(());
        };

        let (outcome, finished) = {
            let mut execution = shared.lock().expect("execution lock");
            let mut results = TaskResults::new(&status.task_id, status.timestamp);
            results.exit_code = status.exit_code;
            let outcome = match status.state {
                TaskState::Staging | TaskState::Starting => Ok(()),
                TaskState::Running => execution.task_start(&status.task_id, status.timestamp),
                TaskState::Finished => {
                    results.exit_code = Some(status.exit_code.unwrap_or(0));
                    execution.task_complete(&results, &self.outcomes)
                }
                TaskState::Lost => {
                    execution.task_lost(&status.task_id, status.timestamp, &self.outcomes)
                }
                TaskState::Failed | TaskState::Error | TaskState::Killed => {
                    execution.task_fail(&results, TASK_FAILED, &self.outcomes)
                }
            };
            (outcome, execution.is_finished())
        };

        if finished {
            self.finish_execution(job_exe_id);
        }
        match outcome {
            Err(ExecutionError::UnknownTask { .. }) => {
                debug!(task_id = %status.task_id, "update for a task that is not current, ignored");
                Ok(())
            }
            other => other.map_err(Into::into),
        }
    }

    /// Drop a terminal execution from the registry and hand it to cleanup.
    fn finish_execution(&self, job_exe_id: JobExeId) {
        if let Some(shared) = self.executions.remove_execution(job_exe_id) {
            let snapshot = shared.lock().expect("execution lock").clone();
            self.cleanup.add_job_execution(snapshot);
        }
    }

    // ── Agents and executors ───────────────────────────────────────

    pub fn agent_lost(&self, agent_id: &str) {
        let _timer = CallbackTimer::start("agent_lost", self.config.db_threshold());
        let hostname = self.nodes.display_name(agent_id);
        warn!(%agent_id, %hostname, "agent lost");

        self.nodes.lost_node(agent_id);
        self.resources.lost_agent(agent_id);

        let when = epoch_secs();
        for shared in self.executions.get_executions_on_node(agent_id) {
            self.lose_execution(&shared, when);
        }
    }

    fn lose_execution(&self, shared: &SharedExecution, when: u64) {
        let (job_exe_id, finished) = {
            let mut execution = shared.lock().expect("execution lock");
            let task_id = execution.current_task().map(|t| t.id.clone());
            match execution.execution_lost(when, &self.outcomes) {
                Ok(()) => {
                    if let Some(task_id) = &task_id {
                        self.recon.remove_task_id(task_id);
                    }
                }
                Err(e) => {
                    error!(job_exe_id = execution.id(), error = %e, "failed to record lost execution");
                    if let Some(task_id) = task_id {
                        self.recon.add_task_ids([task_id]);
                    }
                }
            }
            (execution.id(), execution.is_finished())
        };
        if finished {
            self.finish_execution(job_exe_id);
        }
    }

    pub fn framework_message(&self, executor_id: &str, agent_id: &str, data: &[u8]) {
        let _timer = CallbackTimer::start("framework_message", self.config.in_memory_threshold());
        let hostname = self.nodes.display_name(agent_id);
        info!(%executor_id, %hostname, bytes = data.len(), "framework message received");
    }

    pub fn executor_lost(&self, executor_id: &str, agent_id: &str, status: i32) {
        let _timer = CallbackTimer::start("executor_lost", self.config.in_memory_threshold());
        let hostname = self.nodes.display_name(agent_id);
        warn!(%executor_id, %hostname, status, "executor lost");
    }

    /// The driver hit an unrecoverable error; the process is expected to exit.
    pub fn error(&self, message: &str) {
        error!(%message, "unrecoverable scheduler driver error");
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    fn start_workers(&self) {
        let mut workers = self.workers.lock().expect("workers lock");
        if !workers.is_empty() || *self.shutdown_tx.borrow() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, background workers not started");
            return;
        };

        let db_sync = self.db_sync_worker();
        let recon = self.reconciliation_worker();
        let schedule = self.scheduling_worker();
        let status = self.status_worker();

        workers.push(runtime.spawn(db_sync.run(self.shutdown_tx.subscribe())));
        workers.push(runtime.spawn(recon.run(self.shutdown_tx.subscribe())));
        workers.push(runtime.spawn(schedule.run(self.shutdown_tx.subscribe())));
        workers.push(runtime.spawn(status.run(self.shutdown_tx.subscribe())));
        info!(workers = workers.len(), "background workers started");
    }

    pub fn db_sync_worker(&self) -> DbSyncWorker {
        DbSyncWorker::new(self.syncs.clone(), self.config.db_sync_interval())
    }

    pub fn reconciliation_worker(&self) -> ReconciliationWorker {
        ReconciliationWorker::new(
            self.recon.clone(),
            self.driver.clone(),
            self.config.recon_batch_size,
            self.config.recon_interval(),
        )
    }

    pub fn scheduling_worker(&self) -> SchedulingWorker {
        SchedulingWorker::new(
            self.resources.clone(),
            self.executions.clone(),
            self.recon.clone(),
            self.driver.clone(),
            self.store.clone(),
            self.scheduling.clone(),
            self.config.queue_limit,
            self.config.schedule_interval(),
        )
    }

    pub fn status_worker(&self) -> StatusUpdateWorker {
        StatusUpdateWorker::new(
            self.updates.clone(),
            self.store.clone(),
            self.config.status_interval(),
        )
    }

    /// Signal the background workers to stop. Does not wait for them.
    pub fn shutdown(&self) {
        self.session.lock().expect("session lock").state = ControllerState::Shutdown;
        self.driver.clear();
        let _ = self.shutdown_tx.send(true);
        info!("scheduler shutting down");
    }

    /// Wait for every background worker to exit.
    pub async fn join_workers(&self) {
        let workers = std::mem::take(&mut *self.workers.lock().expect("workers lock"));
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "background worker panicked");
            }
        }
    }

    pub fn generate_status(&self) -> SchedulerStatus {
        let mut report = self.resources.generate_status();
        let nodes = self
            .nodes
            .nodes()
            .into_iter()
            .map(|node| NodeStatus {
                resources: report.agents.remove(&node.agent_id),
                agent_id: node.agent_id,
                hostname: node.hostname,
            })
            .collect();

        let session = self.session.lock().expect("session lock");
        SchedulerStatus {
            state: session.state,
            framework_id: session.framework_id.clone(),
            master: session.master.clone(),
            resources: report.resources,
            nodes,
            executions: ExecutionCounts {
                running: self.executions.len(),
                reconciling: self.recon.len(),
                pending_updates: self.updates.len(),
            },
        }
    }
}
