//! A local stand-in for the cluster manager.
//!
//! Offers each agent's spare capacity on an interval, runs launched tasks
//! on tokio timers (STAGING → RUNNING → FINISHED) and answers
//! reconciliation requests from what it remembers. Every callback goes to
//! the daemon's event channel, the same path a real driver would use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use batchgrid_resources::NodeResources;
use batchgrid_scheduler::{
    MasterInfo, Offer, Resource, SchedulerDriver, SchedulerEvent, TaskSpec, TaskStatus,
};
use batchgrid_state::TaskState;

const FRAMEWORK_ID: &str = "batchgrid-local";

/// Delay between launch and the RUNNING update.
const STARTUP_DELAY: Duration = Duration::from_millis(200);

/// Shape of the simulated cluster.
#[derive(Debug, Clone)]
pub struct ClusterShape {
    pub agents: usize,
    pub capacity: NodeResources,
    pub task_duration: Duration,
    pub offer_interval: Duration,
}

struct SimAgent {
    id: String,
    hostname: String,
    capacity: NodeResources,
}

struct SimTask {
    agent_id: String,
    resources: NodeResources,
    state: TaskState,
}

#[derive(Default)]
struct ClusterState {
    next_offer: u64,
    /// offer_id → agent_id
    outstanding: HashMap<String, String>,
    in_use: HashMap<String, NodeResources>,
    tasks: HashMap<String, SimTask>,
}

pub struct SimulatedCluster {
    me: Weak<SimulatedCluster>,
    agents: Vec<SimAgent>,
    task_duration: Duration,
    offer_interval: Duration,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    runtime: Handle,
    state: Mutex<ClusterState>,
}

impl SimulatedCluster {
    /// Must be called inside a tokio runtime; task timers run on it.
    pub fn new(
        shape: ClusterShape,
        events: mpsc::UnboundedSender<SchedulerEvent>,
    ) -> anyhow::Result<Arc<Self>> {
        let runtime = Handle::try_current()?;
        let agents = (1..=shape.agents)
            .map(|n| SimAgent {
                id: format!("agent-{n}"),
                hostname: format!("node{n}.local"),
                capacity: shape.capacity.clone(),
            })
            .collect();
        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            agents,
            task_duration: shape.task_duration,
            offer_interval: shape.offer_interval,
            events,
            runtime,
            state: Mutex::new(ClusterState::default()),
        }))
    }

    /// Deliver the registration callback carrying this cluster as the driver.
    pub fn register(self: &Arc<Self>) {
        let driver: Arc<dyn SchedulerDriver> = self.clone();
        self.send(SchedulerEvent::Registered {
            driver,
            framework_id: FRAMEWORK_ID.to_string(),
            master: MasterInfo {
                hostname: "localhost".to_string(),
                port: 5050,
            },
        });
    }

    /// Offer spare capacity every interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            agents = self.agents.len(),
            interval_ms = self.offer_interval.as_millis() as u64,
            "simulated cluster started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.offer_interval) => {
                    let offers = self.make_offers();
                    if !offers.is_empty() {
                        debug!(offers = offers.len(), "offering spare capacity");
                        self.send(SchedulerEvent::ResourceOffers(offers));
                    }
                }
                _ = shutdown.changed() => {
                    info!("simulated cluster shutting down");
                    break;
                }
            }
        }
    }

    /// Tasks not yet in a terminal state.
    pub fn active_tasks(&self) -> usize {
        let state = self.state.lock().expect("cluster lock");
        state.tasks.values().filter(|t| !t.state.is_terminal()).count()
    }

    /// One offer per agent that has spare capacity and no offer outstanding.
    fn make_offers(&self) -> Vec<Offer> {
        let mut state = self.state.lock().expect("cluster lock");
        let mut offers = Vec::new();
        for agent in &self.agents {
            if state.outstanding.values().any(|id| id == &agent.id) {
                continue;
            }
            let mut spare = agent.capacity.clone();
            if let Some(used) = state.in_use.get(&agent.id) {
                spare.subtract(used);
            }
            if spare.cpus() <= 0.0 || spare.mem() <= 0.0 {
                continue;
            }

            state.next_offer += 1;
            let offer_id = format!("offer-{}", state.next_offer);
            state.outstanding.insert(offer_id.clone(), agent.id.clone());
            offers.push(Offer {
                id: offer_id,
                agent_id: agent.id.clone(),
                hostname: agent.hostname.clone(),
                resources: vec![
                    Resource::new("cpus", spare.cpus()),
                    Resource::new("mem", spare.mem()),
                    Resource::new("disk", spare.disk()),
                ],
            });
        }
        offers
    }

    fn send(&self, event: SchedulerEvent) {
        if self.events.send(event).is_err() {
            debug!("event channel closed, dropping callback");
        }
    }

    /// Drive one task through RUNNING to FINISHED on timers.
    fn spawn_task(&self, task_id: String, agent_id: String) {
        let Some(cluster) = self.me.upgrade() else {
            return;
        };
        self.runtime.spawn(async move {
            tokio::time::sleep(STARTUP_DELAY).await;
            if cluster.transition(&task_id, TaskState::Running) {
                cluster.send(SchedulerEvent::StatusUpdate(TaskStatus::new(
                    &task_id,
                    &agent_id,
                    TaskState::Running,
                    epoch_secs(),
                )));
            }

            tokio::time::sleep(cluster.task_duration).await;
            if cluster.transition(&task_id, TaskState::Finished) {
                cluster.send(SchedulerEvent::StatusUpdate(
                    TaskStatus::new(&task_id, &agent_id, TaskState::Finished, epoch_secs())
                        .with_exit_code(0),
                ));
            }
        });
    }

    /// Move a task to `to`, releasing its resources when terminal.
    /// Returns false if the task is unknown or already terminal.
    fn transition(&self, task_id: &str, to: TaskState) -> bool {
        let mut state = self.state.lock().expect("cluster lock");
        let ClusterState { tasks, in_use, .. } = &mut *state;
        let Some(task) = tasks.get_mut(task_id) else {
            return false;
        };
        if task.state.is_terminal() {
            return false;
        }
        task.state = to;
        if to.is_terminal()
            && let Some(used) = in_use.get_mut(&task.agent_id)
        {
            used.subtract(&task.resources);
        }
        true
    }
}

impl SchedulerDriver for SimulatedCluster {
    fn launch_tasks(&self, offer_ids: &[String], tasks: Vec<TaskSpec>) -> anyhow::Result<()> {
        {
            let mut state = self.state.lock().expect("cluster lock");
            if let Some(unknown) = offer_ids.iter().find(|id| !state.outstanding.contains_key(*id)) {
                anyhow::bail!("offer {unknown} is not outstanding");
            }
            for id in offer_ids {
                state.outstanding.remove(id);
            }
            for task in &tasks {
                state
                    .in_use
                    .entry(task.agent_id.clone())
                    .or_default()
                    .add(&task.resources);
                state.tasks.insert(
                    task.task_id.clone(),
                    SimTask {
                        agent_id: task.agent_id.clone(),
                        resources: task.resources.clone(),
                        state: TaskState::Staging,
                    },
                );
            }
        }

        info!(offers = offer_ids.len(), tasks = tasks.len(), "tasks launched on simulated cluster");
        for task in tasks {
            self.spawn_task(task.task_id, task.agent_id);
        }
        Ok(())
    }

    fn reconcile_tasks(&self, task_ids: &[String]) -> anyhow::Result<()> {
        let answers: Vec<TaskStatus> = {
            let state = self.state.lock().expect("cluster lock");
            task_ids
                .iter()
                .map(|task_id| match state.tasks.get(task_id) {
                    Some(task) if task.state == TaskState::Finished => {
                        TaskStatus::new(task_id, &task.agent_id, task.state, epoch_secs())
                            .with_exit_code(0)
                    }
                    Some(task) => TaskStatus::new(task_id, &task.agent_id, task.state, epoch_secs()),
                    None => TaskStatus::new(task_id, "", TaskState::Lost, epoch_secs())
                        .with_message("unknown to the cluster"),
                })
                .collect()
        };

        debug!(tasks = answers.len(), "answering reconciliation");
        for status in answers {
            if status.state == TaskState::Lost {
                warn!(task_id = %status.task_id, "reconciled task is unknown, reporting lost");
            }
            self.send(SchedulerEvent::StatusUpdate(status));
        }
        Ok(())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
