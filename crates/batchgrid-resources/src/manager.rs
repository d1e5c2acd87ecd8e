//! `ResourceManager` — cluster-wide resource bookkeeping.
//!
//! The only write path for offers and agent ledgers. Two locks:
//!
//! - `new_offers` guards the pending-offer buffer filled by `resourceOffers`
//! - `agents` guards the agent ledgers and the last watermark reset time
//!
//! Neither lock is ever held while acquiring the other; every path that
//! touches both takes and releases the offer lock first.
//!
//! Each refresh swaps the offer buffer out and bumps a swap counter. A lost
//! agent is remembered in the agent table with the counter value it saw, so
//! a refresh that swapped before the loss drops that agent's stale offers
//! instead of recreating its ledger.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::agent::AgentResources;
use crate::node_resources::NodeResources;
use crate::offer::{ResourceOffer, TaskResources};
use crate::status::{ResourceStatus, ResourceTotals};

/// Time between rolling watermark resets.
pub const WATERMARK_RESET_PERIOD: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct OfferBuffer {
    offers: HashMap<String, ResourceOffer>,
    /// Completed buffer swaps.
    swaps: u64,
}

#[derive(Default)]
struct AgentTable {
    agents: HashMap<String, AgentResources>,
    last_watermark_reset: Option<Instant>,
    /// Agents lost since their offers were last swapped out: agent_id → swap count seen.
    lost_since_refresh: HashMap<String, u64>,
}

/// Manages resources across every agent in the cluster. Thread-safe.
pub struct ResourceManager {
    /// Offers received since the last refresh: offer_id → offer.
    new_offers: Mutex<OfferBuffer>,
    agents: Mutex<AgentTable>,
    watermark_period: Duration,
    #[cfg(test)]
    after_swap: Mutex<Option<Box<dyn FnOnce(&ResourceManager) + Send>>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self {
            new_offers: Mutex::new(OfferBuffer::default()),
            agents: Mutex::new(AgentTable::default()),
            watermark_period: WATERMARK_RESET_PERIOD,
            #[cfg(test)]
            after_swap: Mutex::new(None),
        }
    }

    /// Set the watermark reset period.
    pub fn with_watermark_period(mut self, period: Duration) -> Self {
        self.watermark_period = period;
        self
    }

    /// Buffer a batch of new offers; a repeated offer ID replaces the earlier one.
    pub fn add_new_offers(&self, offers: Vec<ResourceOffer>) {
        let mut buffer = self.new_offers.lock().expect("offers lock");
        for offer in offers {
            buffer.offers.insert(offer.id.clone(), offer);
        }
    }

    /// Remove offers from the pending buffer and from any agent that already absorbed them.
    pub fn remove_offers(&self, offer_ids: &[String]) {
        {
            let mut buffer = self.new_offers.lock().expect("offers lock");
            for id in offer_ids {
                buffer.offers.remove(id);
            }
        }

        let mut table = self.agents.lock().expect("agents lock");
        for agent in table.agents.values_mut() {
            agent.remove_offers(offer_ids);
        }
    }

    /// Forget a lost agent: its pending offers and its ledger.
    ///
    /// Once this returns the agent contributes nothing to any total.
    pub fn lost_agent(&self, agent_id: &str) {
        let (dropped, swaps) = {
            let mut buffer = self.new_offers.lock().expect("offers lock");
            let before = buffer.offers.len();
            buffer.offers.retain(|_, offer| offer.agent_id != agent_id);
            (before - buffer.offers.len(), buffer.swaps)
        };

        let existed = {
            let mut table = self.agents.lock().expect("agents lock");
            table.lost_since_refresh.insert(agent_id.to_string(), swaps);
            table.agents.remove(agent_id).is_some()
        };

        info!(%agent_id, dropped_offers = dropped, existed, "agent resources removed");
    }

    /// Refresh every agent ledger with the given running tasks and the offers
    /// buffered since the previous call.
    pub fn refresh_agent_resources(&self, tasks: &[TaskResources]) {
        self.refresh_agent_resources_at(tasks, Instant::now());
    }

    /// Same as [`refresh_agent_resources`](Self::refresh_agent_resources) with an explicit clock.
    pub fn refresh_agent_resources_at(&self, tasks: &[TaskResources], when: Instant) {
        // Swap the buffer out first: offers arriving from here on belong to the next cycle.
        let (new_offers, swap) = {
            let mut buffer = self.new_offers.lock().expect("offers lock");
            buffer.swaps += 1;
            (std::mem::take(&mut buffer.offers), buffer.swaps)
        };

        self.after_swap_hook();

        let mut agent_offers: HashMap<String, Vec<ResourceOffer>> = HashMap::new();
        for offer in new_offers.into_values() {
            agent_offers.entry(offer.agent_id.clone()).or_default().push(offer);
        }
        let mut agent_tasks: HashMap<&str, Vec<&TaskResources>> = HashMap::new();
        for task in tasks {
            agent_tasks.entry(task.agent_id.as_str()).or_default().push(task);
        }

        let mut table = self.agents.lock().expect("agents lock");

        // An agent lost after this swap has stale offers in the batch; offers
        // for agents lost before it arrived after the loss and count.
        for (agent_id, lost_at) in &table.lost_since_refresh {
            if *lost_at >= swap {
                if let Some(stale) = agent_offers.remove(agent_id) {
                    debug!(%agent_id, dropped_offers = stale.len(), "dropping offers of lost agent");
                }
            }
        }
        table.lost_since_refresh.retain(|_, lost_at| *lost_at > swap);

        for agent_id in agent_offers.keys() {
            if !table.agents.contains_key(agent_id) {
                debug!(%agent_id, "first offer from agent");
                table
                    .agents
                    .insert(agent_id.clone(), AgentResources::new(agent_id.clone()));
            }
        }

        for (agent_id, agent) in table.agents.iter_mut() {
            let offers = agent_offers.remove(agent_id).unwrap_or_default();
            let tasks = agent_tasks.get(agent_id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            agent.refresh_resources(offers, tasks);
        }

        let reset_due = match table.last_watermark_reset {
            Some(last) => when.saturating_duration_since(last) > self.watermark_period,
            None => true,
        };
        if reset_due {
            for agent in table.agents.values_mut() {
                agent.reset_watermark();
            }
            table.last_watermark_reset = Some(when);
            debug!(agents = table.agents.len(), "watermarks reset");
        }
    }

    #[cfg(test)]
    fn after_swap_hook(&self) {
        let hook = self.after_swap.lock().expect("hook lock").take();
        if let Some(hook) = hook {
            hook(self);
        }
    }

    #[cfg(not(test))]
    fn after_swap_hook(&self) {}

    /// Take every offer held for an agent so tasks can be launched against them.
    pub fn allocate_offers(&self, agent_id: &str) -> Vec<ResourceOffer> {
        let mut table = self.agents.lock().expect("agents lock");
        table
            .agents
            .get_mut(agent_id)
            .map(AgentResources::allocate_offers)
            .unwrap_or_default()
    }

    /// Offered (unconsumed) resources per agent, as of the last refresh.
    pub fn available_resources(&self) -> HashMap<String, NodeResources> {
        let table = self.agents.lock().expect("agents lock");
        table
            .agents
            .iter()
            .map(|(id, agent)| (id.clone(), agent.offered().clone()))
            .collect()
    }

    /// Apply a shortage report; agents absent from the map have their shortage cleared.
    pub fn set_agent_shortages(&self, shortages: &HashMap<String, NodeResources>) {
        let mut table = self.agents.lock().expect("agents lock");
        for (agent_id, agent) in table.agents.iter_mut() {
            agent.set_shortage(shortages.get(agent_id).cloned());
        }
    }

    /// Snapshot of a single agent's ledger.
    pub fn agent(&self, agent_id: &str) -> Option<AgentResources> {
        let table = self.agents.lock().expect("agents lock");
        table.agents.get(agent_id).cloned()
    }

    /// Number of agents with a ledger.
    pub fn agent_count(&self) -> usize {
        self.agents.lock().expect("agents lock").agents.len()
    }

    /// Build the resource report by folding every agent into the cluster totals.
    pub fn generate_status(&self) -> ResourceStatus {
        let mut totals = ResourceTotals::default();
        let mut agents = BTreeMap::new();

        let table = self.agents.lock().expect("agents lock");
        for (agent_id, agent) in &table.agents {
            agents.insert(agent_id.clone(), agent.generate_status(&mut totals));
        }

        ResourceStatus {
            resources: totals,
            agents,
        }
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}
