//! Resource offers and the task projection used for accounting.

use crate::node_resources::NodeResources;

/// A cluster manager's proposal of resources on one agent.
///
/// Valid until launched against, rescinded, or the agent is lost.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceOffer {
    pub id: String,
    pub agent_id: String,
    pub resources: NodeResources,
}

impl ResourceOffer {
    pub fn new(id: impl Into<String>, agent_id: impl Into<String>, resources: NodeResources) -> Self {
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            resources,
        }
    }
}

/// Minimal view of a launched task: where it runs and what it consumes.
///
/// The execution registry owns the real task; this is only what the
/// resource ledgers need.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResources {
    pub task_id: String,
    pub agent_id: String,
    pub resources: NodeResources,
}
