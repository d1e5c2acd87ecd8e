//! `AgentResources` — the authoritative resource ledger for one agent.
//!
//! Owned exclusively by `ResourceManager`; every mutation happens under
//! the manager's agent-map lock.

use std::collections::HashMap;

use tracing::debug;

use crate::node_resources::NodeResources;
use crate::offer::{ResourceOffer, TaskResources};
use crate::status::{AgentResourceStatus, ResourceTotals};

/// Rolling low/high marks of an agent's running + offered total.
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub min: NodeResources,
    pub max: NodeResources,
}

impl Watermark {
    fn at(total: &NodeResources) -> Self {
        Self {
            min: total.clone(),
            max: total.clone(),
        }
    }

    fn widen(&mut self, total: &NodeResources) {
        self.min.limit_to(total);
        self.max.increase_up_to(total);
    }
}

/// Resource ledger for a single agent.
#[derive(Debug, Clone)]
pub struct AgentResources {
    agent_id: String,
    /// Unconsumed offers on this agent: offer_id → offer.
    offers: HashMap<String, ResourceOffer>,
    offered: NodeResources,
    running: NodeResources,
    /// `None` until the first refresh observes a total.
    watermark: Option<Watermark>,
    shortage: Option<NodeResources>,
}

impl AgentResources {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            offers: HashMap::new(),
            offered: NodeResources::new(),
            running: NodeResources::new(),
            watermark: None,
            shortage: None,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Sum of the unconsumed offers on this agent.
    pub fn offered(&self) -> &NodeResources {
        &self.offered
    }

    /// Sum of the resources consumed by tasks believed to be running here.
    pub fn running(&self) -> &NodeResources {
        &self.running
    }

    pub fn watermark(&self) -> Option<&Watermark> {
        self.watermark.as_ref()
    }

    pub fn shortage(&self) -> Option<&NodeResources> {
        self.shortage.as_ref()
    }

    /// Running plus offered.
    pub fn total(&self) -> NodeResources {
        self.running.clone() + self.offered.clone()
    }

    /// IDs of the offers currently held for this agent.
    pub fn offer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.offers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Refresh this ledger from the current cycle's offers and tasks.
    ///
    /// Offers are keyed by ID, so an offer seen in an earlier cycle is
    /// never counted twice; `offered` is recomputed from the held set.
    /// `running` is replaced outright by the sum of `tasks`.
    pub fn refresh_resources(&mut self, offers: Vec<ResourceOffer>, tasks: &[&TaskResources]) {
        for offer in offers {
            self.offers.insert(offer.id.clone(), offer);
        }
        self.recompute_offered();
        self.running = tasks.iter().map(|t| &t.resources).sum();

        let total = self.total();
        match self.watermark.as_mut() {
            Some(watermark) => watermark.widen(&total),
            None => self.watermark = Some(Watermark::at(&total)),
        }

        debug!(
            agent_id = %self.agent_id,
            offers = self.offers.len(),
            tasks = tasks.len(),
            running = %self.running,
            offered = %self.offered,
            "agent resources refreshed"
        );
    }

    /// Drop the given offer IDs (rescinded between refresh cycles).
    pub fn remove_offers(&mut self, offer_ids: &[String]) {
        let before = self.offers.len();
        for id in offer_ids {
            self.offers.remove(id);
        }
        if self.offers.len() != before {
            self.recompute_offered();
        }
    }

    /// Take every held offer for launching; the agent is left with nothing offered.
    pub fn allocate_offers(&mut self) -> Vec<ResourceOffer> {
        let offers: Vec<ResourceOffer> = self.offers.drain().map(|(_, o)| o).collect();
        self.offered = NodeResources::new();
        offers
    }

    /// Collapse the rolling window onto the current running + offered total.
    pub fn reset_watermark(&mut self) {
        self.watermark = Some(Watermark::at(&self.total()));
    }

    /// Record this cycle's shortage, or clear it with `None`.
    pub fn set_shortage(&mut self, shortage: Option<NodeResources>) {
        self.shortage = shortage;
    }

    /// Build this agent's status entry and fold its figures into `totals`.
    pub fn generate_status(&self, totals: &mut ResourceTotals) -> AgentResourceStatus {
        let watermark = self
            .watermark
            .clone()
            .unwrap_or_else(|| Watermark::at(&self.total()));

        totals.running += &self.running;
        totals.offered += &self.offered;
        totals.watermark += &watermark.max;

        AgentResourceStatus {
            running: self.running.clone(),
            offered: self.offered.clone(),
            watermark: watermark.max,
            watermark_min: watermark.min,
            shortage: self.shortage.clone(),
        }
    }

    fn recompute_offered(&mut self) {
        self.offered = self.offers.values().map(|o| &o.resources).sum();
    }
}
