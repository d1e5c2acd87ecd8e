//! batchgrid-state — durable state store for BatchGrid.
//!
//! Backed by [redb](https://docs.rs/redb), holds the records the scheduler
//! must not lose across restarts: job executions, the queue of pending
//! work, built-in error kinds, the task status log, and the master the
//! scheduler last registered with.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Numeric IDs are zero-padded in keys so table iteration order matches
//! numeric order.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across scheduler workers.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
