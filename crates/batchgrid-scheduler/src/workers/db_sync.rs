//! Database sync worker — refreshes the registered caches on an interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::sync::{CacheSync, sync_all};

pub struct DbSyncWorker {
    syncs: Vec<Arc<dyn CacheSync>>,
    interval: Duration,
}

impl DbSyncWorker {
    pub fn new(syncs: Vec<Arc<dyn CacheSync>>, interval: Duration) -> Self {
        Self { syncs, interval }
    }

    /// Run the sync loop until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            caches = self.syncs.len(),
            "db sync worker started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let synced = sync_all(&self.syncs);
                    debug!(synced, total = self.syncs.len(), "db sync pass");
                }
                _ = shutdown.changed() => {
                    info!("db sync worker shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl CacheSync for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn sync(&self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn syncs_each_interval_until_shutdown() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let worker = DbSyncWorker::new(vec![counter.clone()], Duration::from_secs(10));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(rx));

        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
