//! Scheduling worker — matches pending work to offered capacity and launches it.
//!
//! Each pass:
//! 1. refreshes agent ledgers from the offers received since the last pass
//!    and the tasks the registry believes are running,
//! 2. places the next task of every execution awaiting launch on its own agent,
//! 3. places queued jobs best-fit onto the agent with the least spare capacity,
//! 4. launches against the chosen agents' offers,
//! 5. publishes per-agent shortages for tasks that did not fit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use batchgrid_execution::{JobTask, RunningExecutionRegistry, RunningJobExecution, SharedExecution};
use batchgrid_resources::{NodeResources, ResourceManager};
use batchgrid_state::{StateError, StateStore};

use crate::driver::{DriverHandle, SchedulerDriver};
use crate::error::SchedulerResult;
use crate::event::TaskSpec;
use crate::recon::ReconciliationTracker;
use crate::timing::epoch_secs;

/// What one scheduling pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePass {
    /// Queued jobs moved onto an agent.
    pub jobs_scheduled: usize,
    /// Tasks handed to the cluster manager.
    pub tasks_launched: usize,
    /// Agents reporting a shortage.
    pub agents_short: usize,
}

/// Tasks chosen for one agent this pass.
type Placements = BTreeMap<String, Vec<(SharedExecution, JobTask)>>;

pub struct SchedulingWorker {
    resources: Arc<ResourceManager>,
    executions: Arc<RunningExecutionRegistry>,
    recon: Arc<ReconciliationTracker>,
    driver: DriverHandle,
    store: StateStore,
    /// Held while a queued job moves from storage into the registry.
    scheduling: Arc<Mutex<()>>,
    queue_limit: usize,
    interval: Duration,
}

impl SchedulingWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resources: Arc<ResourceManager>,
        executions: Arc<RunningExecutionRegistry>,
        recon: Arc<ReconciliationTracker>,
        driver: DriverHandle,
        store: StateStore,
        scheduling: Arc<Mutex<()>>,
        queue_limit: usize,
        interval: Duration,
    ) -> Self {
        Self {
            resources,
            executions,
            recon,
            driver,
            store,
            scheduling,
            queue_limit,
            interval,
        }
    }

    /// Run the scheduling loop until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "scheduling worker started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    match self.schedule() {
                        Ok(pass) if pass.tasks_launched > 0 => {
                            debug!(
                                jobs = pass.jobs_scheduled,
                                tasks = pass.tasks_launched,
                                agents_short = pass.agents_short,
                                "scheduling pass"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "scheduling pass failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduling worker shutting down");
                    break;
                }
            }
        }
    }

    /// Perform one scheduling pass.
    pub fn schedule(&self) -> SchedulerResult<SchedulePass> {
        self.resources
            .refresh_agent_resources(&self.executions.task_resources());

        let mut pass = SchedulePass::default();
        let Some(driver) = self.driver.get() else {
            debug!("no driver session, skipping launch");
            return Ok(pass);
        };

        let mut available = self.resources.available_resources();
        let mut placements = Placements::new();
        let mut shortages: HashMap<String, NodeResources> = HashMap::new();

        self.place_next_tasks(&mut available, &mut placements, &mut shortages);
        pass.jobs_scheduled = self.place_queued_jobs(&mut available, &mut placements)?;
        pass.tasks_launched = self.launch(driver.as_ref(), placements);

        pass.agents_short = shortages.len();
        self.resources.set_agent_shortages(&shortages);
        Ok(pass)
    }

    fn place_next_tasks(
        &self,
        available: &mut HashMap<String, NodeResources>,
        placements: &mut Placements,
        shortages: &mut HashMap<String, NodeResources>,
    ) {
        for shared in self.executions.executions_awaiting_launch() {
            let Some(task) = shared
                .lock()
                .expect("execution lock")
                .next_task_to_launch()
                .cloned()
            else {
                continue;
            };

            let spare = available.entry(task.agent_id.clone()).or_default();
            if task.resources.is_satisfied_by(spare) {
                spare.subtract(&task.resources);
                placements
                    .entry(task.agent_id.clone())
                    .or_default()
                    .push((shared, task));
            } else {
                let deficit = task.resources.shortfall(spare);
                shortages
                    .entry(task.agent_id.clone())
                    .or_default()
                    .add(&deficit);
            }
        }
    }

    fn place_queued_jobs(
        &self,
        available: &mut HashMap<String, NodeResources>,
        placements: &mut Placements,
    ) -> SchedulerResult<usize> {
        let queued = self.store.list_queued_jobs(self.queue_limit)?;
        let mut scheduled = 0;

        for job in queued {
            let Some(agent_id) = best_fit(available, &job.resources) else {
                continue;
            };

            let (shared, task) = {
                let _guard = self.scheduling.lock().expect("scheduling lock");
                let record =
                    match self.store.schedule_queued_job(job.job_exe_id, &agent_id, epoch_secs()) {
                        Ok(record) => record,
                        Err(StateError::QueueConflict(job_exe_id)) => {
                            warn!(job_exe_id, "job left the queue before it was scheduled");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };
                let execution = RunningJobExecution::from_record(&record)?;
                let shared = self.executions.add(execution);
                let task = shared
                    .lock()
                    .expect("execution lock")
                    .next_task_to_launch()
                    .cloned();
                (shared, task)
            };
            let Some(task) = task else { continue };

            if let Some(spare) = available.get_mut(&agent_id) {
                spare.subtract(&task.resources);
            }
            info!(job_exe_id = job.job_exe_id, %agent_id, job_type = %job.job_type, "queued job scheduled");
            placements.entry(agent_id).or_default().push((shared, task));
            scheduled += 1;
        }
        Ok(scheduled)
    }

    fn launch(&self, driver: &dyn SchedulerDriver, placements: Placements) -> usize {
        let mut launched = 0;
        for (agent_id, tasks) in placements {
            let offers = self.resources.allocate_offers(&agent_id);
            if offers.is_empty() {
                warn!(%agent_id, tasks = tasks.len(), "no offers left to launch against");
                continue;
            }
            let offer_ids: Vec<String> = offers.into_iter().map(|o| o.id).collect();

            let when = epoch_secs();
            let mut specs = Vec::with_capacity(tasks.len());
            for (shared, task) in &tasks {
                let mut execution = shared.lock().expect("execution lock");
                if let Err(e) = execution.task_launched(&task.id, when) {
                    warn!(task_id = %task.id, error = %e, "task no longer awaiting launch");
                    continue;
                }
                specs.push(TaskSpec {
                    task_id: task.id.clone(),
                    agent_id: task.agent_id.clone(),
                    job_type: execution.job_type().to_string(),
                    kind: task.kind,
                    resources: task.resources.clone(),
                });
            }

            let task_ids: Vec<String> = specs.iter().map(|s| s.task_id.clone()).collect();
            let count = specs.len();
            match driver.launch_tasks(&offer_ids, specs) {
                Ok(()) => {
                    debug!(%agent_id, tasks = count, offers = offer_ids.len(), "tasks launched");
                    launched += count;
                }
                Err(e) => {
                    error!(%agent_id, error = %e, "launch failed, reconciling tasks");
                    self.recon.add_task_ids(task_ids);
                }
            }
        }
        launched
    }
}

/// The agent whose spare capacity is smallest while still fitting `request`.
fn best_fit(available: &HashMap<String, NodeResources>, request: &NodeResources) -> Option<String> {
    available
        .iter()
        .filter(|(_, spare)| request.is_satisfied_by(spare))
        .map(|(agent_id, spare)| {
            let left = spare.clone() - request.clone();
            (left.cpus(), left.mem(), left.disk(), agent_id)
        })
        .min_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.total_cmp(&b.1))
                .then(a.2.total_cmp(&b.2))
                .then(a.3.cmp(&b.3))
        })
        .map(|(_, _, _, agent_id)| agent_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_fit_prefers_tightest_agent() {
        let available = HashMap::from([
            ("big".to_string(), NodeResources::from_scalars(8.0, 8192.0, 0.0)),
            ("small".to_string(), NodeResources::from_scalars(2.0, 1024.0, 0.0)),
            ("tiny".to_string(), NodeResources::from_scalars(0.5, 256.0, 0.0)),
        ]);
        let request = NodeResources::from_scalars(1.0, 512.0, 0.0);
        assert_eq!(best_fit(&available, &request).as_deref(), Some("small"));
    }

    #[test]
    fn best_fit_none_when_nothing_fits() {
        let available = HashMap::from([(
            "a1".to_string(),
            NodeResources::from_scalars(1.0, 128.0, 0.0),
        )]);
        let request = NodeResources::from_scalars(2.0, 64.0, 0.0);
        assert!(best_fit(&available, &request).is_none());
    }

    #[test]
    fn best_fit_breaks_ties_by_agent_id() {
        let available = HashMap::from([
            ("b".to_string(), NodeResources::from_scalars(2.0, 256.0, 0.0)),
            ("a".to_string(), NodeResources::from_scalars(2.0, 256.0, 0.0)),
        ]);
        let request = NodeResources::from_scalars(1.0, 128.0, 0.0);
        assert_eq!(best_fit(&available, &request).as_deref(), Some("a"));
    }
}
