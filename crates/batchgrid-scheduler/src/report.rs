//! Typed scheduler status report.

use serde::Serialize;

use batchgrid_resources::{AgentResourceStatus, ResourceTotals};

use crate::event::MasterInfo;

/// Registration state of the scheduler with the cluster manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Unregistered,
    Registered,
    /// Lost the master; waiting to re-register.
    Disconnected,
    Shutdown,
}

/// One node's entry in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub agent_id: String,
    pub hostname: Option<String>,
    /// Resource ledger, once the agent has been through a refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<AgentResourceStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionCounts {
    pub running: usize,
    /// Task IDs awaiting reconciliation.
    pub reconciling: usize,
    /// Status updates not yet flushed to storage.
    pub pending_updates: usize,
}

/// Snapshot of the scheduler for observability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub state: ControllerState,
    pub framework_id: Option<String>,
    pub master: Option<MasterInfo>,
    /// Cluster totals: `resources.{running,offered,watermark}`.
    pub resources: ResourceTotals,
    pub nodes: Vec<NodeStatus>,
    pub executions: ExecutionCounts,
}
