//! Status-update worker — flushes buffered task updates into the durable log.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use batchgrid_state::{StateResult, StateStore};

use crate::updates::TaskUpdateQueue;

pub struct StatusUpdateWorker {
    queue: Arc<TaskUpdateQueue>,
    store: StateStore,
    interval: Duration,
}

impl StatusUpdateWorker {
    pub fn new(queue: Arc<TaskUpdateQueue>, store: StateStore, interval: Duration) -> Self {
        Self {
            queue,
            store,
            interval,
        }
    }

    /// Run the flush loop until shutdown, flushing once more on the way out.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "status update worker started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Err(e) = self.flush() {
                        error!(error = %e, "storing task updates failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("status update worker shutting down");
                    if let Err(e) = self.flush() {
                        error!(error = %e, "final task update flush failed");
                    }
                    break;
                }
            }
        }
    }

    /// Write every buffered update. On failure the updates go back on the
    /// queue for the next attempt. Returns how many were stored.
    pub fn flush(&self) -> StateResult<usize> {
        let updates = self.queue.drain();
        if updates.is_empty() {
            return Ok(0);
        }
        match self.store.append_task_updates(&updates) {
            Ok(()) => {
                debug!(count = updates.len(), "task updates flushed");
                Ok(updates.len())
            }
            Err(e) => {
                self.queue.requeue(updates);
                Err(e)
            }
        }
    }
}
