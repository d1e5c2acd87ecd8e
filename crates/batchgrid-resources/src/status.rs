//! Typed resource status report.
//!
//! Built by folding each agent's ledger into cluster totals, so the
//! totals are recomputed on every report (O(agents)).

use std::collections::BTreeMap;

use serde::Serialize;

use crate::node_resources::NodeResources;

/// Cluster-wide totals, serialized as `resources.{running,offered,watermark}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceTotals {
    pub running: NodeResources,
    pub offered: NodeResources,
    pub watermark: NodeResources,
}

/// One agent's contribution to the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResourceStatus {
    pub running: NodeResources,
    pub offered: NodeResources,
    /// High-water mark of running + offered within the current window.
    pub watermark: NodeResources,
    /// Low-water mark of running + offered within the current window.
    pub watermark_min: NodeResources,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortage: Option<NodeResources>,
}

/// Resource section of the scheduler status report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceStatus {
    pub resources: ResourceTotals,
    /// Per-agent entries keyed by agent ID.
    pub agents: BTreeMap<String, AgentResourceStatus>,
}
