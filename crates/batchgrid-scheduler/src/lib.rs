//! batchgrid-scheduler — the scheduling core of BatchGrid.
//!
//! Receives cluster-manager callbacks (offers, rescissions, status updates,
//! agent and executor loss), keeps the resource ledgers and the running
//! execution registry in step with them, and drives four background
//! workers that launch work and chase down lost task state.
//!
//! # Architecture
//!
//! ```text
//! cluster manager ──SchedulerEvent──▶ SchedulerEventController
//!                                       ├── NodeManager (agent hostnames)
//!                                       ├── ResourceManager (offers, ledgers, watermarks)
//!                                       ├── RunningExecutionRegistry (execution state machines)
//!                                       ├── ReconciliationTracker (unconfirmed task IDs)
//!                                       ├── CleanupManager (finished executions)
//!                                       └── workers
//!                                           ├── DbSyncWorker (cache refresh)
//!                                           ├── ReconciliationWorker ──reconcile_tasks──▶ driver
//!                                           ├── SchedulingWorker ──launch_tasks──▶ driver
//!                                           └── StatusUpdateWorker (task update log)
//! ```

pub mod cleanup;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod event;
pub mod node;
pub mod recon;
pub mod report;
pub mod sync;
pub mod timing;
pub mod updates;
pub mod workers;

pub use cleanup::{CleanupManager, CleanupQueue};
pub use config::SchedulerConfig;
pub use controller::SchedulerEventController;
pub use driver::{DriverHandle, SchedulerDriver};
pub use error::{SchedulerError, SchedulerResult};
pub use event::{MasterInfo, Offer, Resource, SchedulerEvent, TaskSpec, TaskStatus};
pub use node::{Node, NodeManager};
pub use recon::ReconciliationTracker;
pub use report::{ControllerState, ExecutionCounts, NodeStatus, SchedulerStatus};
pub use sync::CacheSync;
pub use timing::CallbackTimer;
pub use updates::TaskUpdateQueue;
