//! Cluster-manager events and the messages they carry.
//!
//! The cluster-manager client turns each callback into one
//! [`SchedulerEvent`] and hands it to
//! [`SchedulerEventController::handle`](crate::SchedulerEventController::handle).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use batchgrid_resources::{CPUS, DISK, MEM, NodeResources};
use batchgrid_state::{TaskKind, TaskState, TaskUpdate};

use crate::driver::SchedulerDriver;

/// One named scalar resource within an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub value: f64,
}

impl Resource {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Resources the cluster manager proposes on one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub agent_id: String,
    pub hostname: String,
    pub resources: Vec<Resource>,
}

impl Offer {
    /// CPU, memory and disk offered; missing names count as zero.
    pub fn node_resources(&self) -> NodeResources {
        let mut resources = NodeResources::new();
        for resource in &self.resources {
            if matches!(resource.name.as_str(), CPUS | MEM | DISK) {
                let total = resources.get(&resource.name) + resource.value;
                resources.set(&resource.name, total);
            }
        }
        resources
    }
}

/// Address of the cluster-manager master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterInfo {
    pub hostname: String,
    pub port: u16,
}

impl std::fmt::Display for MasterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// A task status reported by the cluster manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub agent_id: String,
    pub state: TaskState,
    /// Unix timestamp (seconds) the state was observed.
    pub timestamp: u64,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
}

impl TaskStatus {
    pub fn new(
        task_id: impl Into<String>,
        agent_id: impl Into<String>,
        state: TaskState,
        timestamp: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            state,
            timestamp,
            exit_code: None,
            message: None,
        }
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The durable log entry for this status.
    pub fn to_update(&self) -> TaskUpdate {
        TaskUpdate {
            task_id: self.task_id.clone(),
            agent_id: self.agent_id.clone(),
            state: self.state,
            timestamp: self.timestamp,
            exit_code: self.exit_code,
            message: self.message.clone(),
        }
    }
}

/// A task handed to the cluster manager for launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub agent_id: String,
    pub job_type: String,
    pub kind: TaskKind,
    pub resources: NodeResources,
}

/// Every callback the cluster manager can deliver.
pub enum SchedulerEvent {
    Registered {
        driver: Arc<dyn SchedulerDriver>,
        framework_id: String,
        master: MasterInfo,
    },
    Reregistered {
        driver: Arc<dyn SchedulerDriver>,
        master: MasterInfo,
    },
    Disconnected,
    ResourceOffers(Vec<Offer>),
    OfferRescinded(String),
    StatusUpdate(TaskStatus),
    FrameworkMessage {
        executor_id: String,
        agent_id: String,
        data: Vec<u8>,
    },
    AgentLost(String),
    ExecutorLost {
        executor_id: String,
        agent_id: String,
        status: i32,
    },
    Error(String),
}

impl SchedulerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::Reregistered { .. } => "reregistered",
            Self::Disconnected => "disconnected",
            Self::ResourceOffers(_) => "resource_offers",
            Self::OfferRescinded(_) => "offer_rescinded",
            Self::StatusUpdate(_) => "status_update",
            Self::FrameworkMessage { .. } => "framework_message",
            Self::AgentLost(_) => "agent_lost",
            Self::ExecutorLost { .. } => "executor_lost",
            Self::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(resources: Vec<Resource>) -> Offer {
        Offer {
            id: "o1".into(),
            agent_id: "a1".into(),
            hostname: "host-1".into(),
            resources,
        }
    }

    #[test]
    fn missing_resources_default_to_zero() {
        let offer = offer(vec![Resource::new(CPUS, 4.0)]);
        assert_eq!(offer.node_resources(), NodeResources::from_scalars(4.0, 0.0, 0.0));
    }

    #[test]
    fn unrelated_resources_are_ignored() {
        let offer = offer(vec![
            Resource::new(CPUS, 2.0),
            Resource::new(MEM, 1024.0),
            Resource::new(DISK, 10.0),
            Resource::new("ports", 100.0),
        ]);
        let resources = offer.node_resources();
        assert_eq!(resources, NodeResources::from_scalars(2.0, 1024.0, 10.0));
        assert_eq!(resources.get("ports"), 0.0);
    }

    #[test]
    fn status_becomes_update() {
        let status = TaskStatus::new("1_main", "a1", TaskState::Failed, 99)
            .with_exit_code(3)
            .with_message("boom");
        let update = status.to_update();
        assert_eq!(update.task_id, "1_main");
        assert_eq!(update.state, TaskState::Failed);
        assert_eq!(update.exit_code, Some(3));
        assert_eq!(update.message.as_deref(), Some("boom"));
    }
}
