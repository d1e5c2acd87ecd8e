//! batchgrid-resources — cluster resource accounting for BatchGrid.
//!
//! Tracks what each agent is running and what the cluster manager has
//! offered, and keeps a rolling watermark of per-agent totals for
//! capacity planning.
//!
//! # Components
//!
//! - **`node_resources`** — `NodeResources` value type (cpus, mem, disk, ...)
//! - **`offer`** — `ResourceOffer` and the `TaskResources` projection
//! - **`agent`** — `AgentResources`, the single-agent ledger
//! - **`manager`** — `ResourceManager`, the cluster-wide, thread-safe owner of all ledgers
//! - **`status`** — typed status report built by folding agent ledgers
//!
//! # Data flow
//!
//! ```text
//! resourceOffers ──▶ ResourceManager::add_new_offers ──▶ pending buffer
//!                                                            │
//! scheduling pass ──▶ refresh_agent_resources(tasks) ◀───────┘ (swap)
//!                          │
//!                          └──▶ AgentResources::refresh_resources(offers, tasks)
//! ```

pub mod agent;
pub mod manager;
pub mod node_resources;
pub mod offer;
pub mod status;

pub use agent::{AgentResources, Watermark};
pub use manager::{ResourceManager, WATERMARK_RESET_PERIOD};
pub use node_resources::{CPUS, DISK, MEM, NodeResources};
pub use offer::{ResourceOffer, TaskResources};
pub use status::{AgentResourceStatus, ResourceStatus, ResourceTotals};
