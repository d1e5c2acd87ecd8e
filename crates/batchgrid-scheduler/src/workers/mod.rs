//! Background workers started when the scheduler registers.
//!
//! Each worker is a loop over `tokio::time::sleep` that checks a shared
//! `watch` shutdown channel between passes; a pass always runs to
//! completion once started.

pub mod db_sync;
pub mod recon;
pub mod schedule;
pub mod status;

pub use db_sync::DbSyncWorker;
pub use recon::ReconciliationWorker;
pub use schedule::{SchedulePass, SchedulingWorker};
pub use status::StatusUpdateWorker;
