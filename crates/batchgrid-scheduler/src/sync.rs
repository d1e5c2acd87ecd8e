//! Periodically refreshed caches (job types, scheduler settings, workspaces).

use std::sync::Arc;

use tracing::{debug, warn};

/// A cache refreshed from the database on registration and then periodically.
pub trait CacheSync: Send + Sync {
    fn name(&self) -> &str;

    fn sync(&self) -> anyhow::Result<()>;
}

/// Run every sync, logging failures. Returns how many succeeded.
pub fn sync_all(syncs: &[Arc<dyn CacheSync>]) -> usize {
    let mut synced = 0;
    for cache in syncs {
        match cache.sync() {
            Ok(()) => {
                debug!(cache = cache.name(), "cache synced");
                synced += 1;
            }
            Err(e) => warn!(cache = cache.name(), error = %e, "cache sync failed"),
        }
    }
    synced
}
