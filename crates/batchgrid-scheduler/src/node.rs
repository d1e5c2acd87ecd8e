//! Node registry — the agents the cluster manager has offered resources from.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, info};

/// An agent known to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub agent_id: String,
    /// Hostname reported with the agent's offers, once seen.
    pub hostname: Option<String>,
}

/// Registry of live agents keyed by agent ID.
pub struct NodeManager {
    nodes: Mutex<HashMap<String, Node>>,
}

impl NodeManager {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Register agents by ID; already-known agents are left as they are.
    pub fn register_agent_ids(&self, agent_ids: &[String]) {
        let mut nodes = self.nodes.lock().expect("nodes lock");
        for agent_id in agent_ids {
            if !nodes.contains_key(agent_id) {
                nodes.insert(
                    agent_id.clone(),
                    Node {
                        agent_id: agent_id.clone(),
                        hostname: None,
                    },
                );
                info!(%agent_id, "node registered");
            }
        }
    }

    /// Record the hostname of a registered agent.
    pub fn set_hostname(&self, agent_id: &str, hostname: &str) {
        let mut nodes = self.nodes.lock().expect("nodes lock");
        if let Some(node) = nodes.get_mut(agent_id)
            && node.hostname.as_deref() != Some(hostname)
        {
            node.hostname = Some(hostname.to_string());
            debug!(%agent_id, %hostname, "node hostname recorded");
        }
    }

    pub fn get_node(&self, agent_id: &str) -> Option<Node> {
        self.nodes.lock().expect("nodes lock").get(agent_id).cloned()
    }

    pub fn lost_node(&self, agent_id: &str) -> Option<Node> {
        let removed = self.nodes.lock().expect("nodes lock").remove(agent_id);
        if removed.is_some() {
            info!(%agent_id, "node removed");
        }
        removed
    }

    /// Hostname for log output, falling back to the agent ID.
    pub fn display_name(&self, agent_id: &str) -> String {
        self.get_node(agent_id)
            .and_then(|n| n.hostname)
            .unwrap_or_else(|| agent_id.to_string())
    }

    /// All registered nodes, ordered by agent ID.
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .nodes
            .lock()
            .expect("nodes lock")
            .values()
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        nodes
    }
}

impl Default for NodeManager {
    fn default() -> Self {
        Self::new()
    }
}
