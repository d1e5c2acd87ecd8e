//! Reconciliation worker — keeps asking the cluster manager about unconfirmed tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::driver::DriverHandle;
use crate::recon::ReconciliationTracker;

pub struct ReconciliationWorker {
    tracker: Arc<ReconciliationTracker>,
    driver: DriverHandle,
    batch_size: usize,
    interval: Duration,
}

impl ReconciliationWorker {
    pub fn new(
        tracker: Arc<ReconciliationTracker>,
        driver: DriverHandle,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            tracker,
            driver,
            batch_size: batch_size.max(1),
            interval,
        }
    }

    /// Run the reconciliation loop until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "reconciliation worker started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.reconcile();
                }
                _ = shutdown.changed() => {
                    info!("reconciliation worker shutting down");
                    break;
                }
            }
        }
    }

    /// Send every tracked task ID to the cluster manager, in batches.
    ///
    /// IDs are never removed here; only status updates drain the tracker.
    /// Returns how many IDs were sent.
    pub fn reconcile(&self) -> usize {
        let task_ids = self.tracker.task_ids();
        if task_ids.is_empty() {
            return 0;
        }
        let Some(driver) = self.driver.get() else {
            debug!(tasks = task_ids.len(), "no driver session, reconciliation deferred");
            return 0;
        };

        let mut sent = 0;
        for batch in task_ids.chunks(self.batch_size) {
            match driver.reconcile_tasks(batch) {
                Ok(()) => sent += batch.len(),
                Err(e) => {
                    warn!(error = %e, tasks = batch.len(), "reconciliation request failed");
                    break;
                }
            }
        }
        info!(sent, tracked = task_ids.len(), "reconciliation requested");
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::driver::SchedulerDriver;
    use crate::event::TaskSpec;

    #[derive(Default)]
    struct RecordingDriver {
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl SchedulerDriver for RecordingDriver {
        fn launch_tasks(&self, _offer_ids: &[String], _tasks: Vec<TaskSpec>) -> anyhow::Result<()> {
            Ok(())
        }

        fn reconcile_tasks(&self, task_ids: &[String]) -> anyhow::Result<()> {
            self.batches.lock().unwrap().push(task_ids.to_vec());
            Ok(())
        }
    }

    #[test]
    fn tracked_ids_sent_in_batches_and_kept() {
        let tracker = Arc::new(ReconciliationTracker::new());
        tracker.add_task_ids(["1_main", "2_main", "3_main"]);
        let driver = Arc::new(RecordingDriver::default());
        let handle = DriverHandle::new();
        handle.set(driver.clone());

        let worker = ReconciliationWorker::new(tracker.clone(), handle, 2, Duration::from_secs(1));
        assert_eq!(worker.reconcile(), 3);

        let batches = driver.batches.lock().unwrap().clone();
        assert_eq!(batches, vec![vec!["1_main", "2_main"], vec!["3_main"]]);
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn nothing_sent_without_driver() {
        let tracker = Arc::new(ReconciliationTracker::new());
        tracker.add_task_ids(["1_main"]);
        let worker =
            ReconciliationWorker::new(tracker, DriverHandle::new(), 10, Duration::from_secs(1));
        assert_eq!(worker.reconcile(), 0);
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let worker = ReconciliationWorker::new(
            Arc::new(ReconciliationTracker::new()),
            DriverHandle::new(),
            10,
            Duration::from_secs(60),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(rx));
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
