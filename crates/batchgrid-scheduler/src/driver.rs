//! The cluster-manager session as seen by the scheduler.

use std::sync::{Arc, RwLock};

use crate::event::TaskSpec;

/// Requests the scheduler sends back to the cluster manager.
pub trait SchedulerDriver: Send + Sync {
    /// Launch `tasks` against the given offers. Unused offer capacity is
    /// returned to the cluster manager.
    fn launch_tasks(&self, offer_ids: &[String], tasks: Vec<TaskSpec>) -> anyhow::Result<()>;

    /// Ask for the current state of each task; answers arrive as status updates.
    fn reconcile_tasks(&self, task_ids: &[String]) -> anyhow::Result<()>;
}

/// Shared slot holding the current driver session.
///
/// Workers keep a clone of the handle, so a session replaced on
/// re-registration is picked up on their next pass.
#[derive(Clone, Default)]
pub struct DriverHandle {
    inner: Arc<RwLock<Option<Arc<dyn SchedulerDriver>>>>,
}

impl DriverHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, driver: Arc<dyn SchedulerDriver>) {
        *self.inner.write().expect("driver lock") = Some(driver);
    }

    pub fn get(&self) -> Option<Arc<dyn SchedulerDriver>> {
        self.inner.read().expect("driver lock").clone()
    }

    pub fn clear(&self) {
        *self.inner.write().expect("driver lock") = None;
    }

    pub fn is_set(&self) -> bool {
        self.inner.read().expect("driver lock").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopDriver;

    impl SchedulerDriver for NoopDriver {
        fn launch_tasks(&self, _offer_ids: &[String], _tasks: Vec<TaskSpec>) -> anyhow::Result<()> {
            Ok(())
        }

        fn reconcile_tasks(&self, _task_ids: &[String]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn clones_share_the_session() {
        let handle = DriverHandle::new();
        let worker_copy = handle.clone();
        assert!(worker_copy.get().is_none());

        handle.set(Arc::new(NoopDriver));
        assert!(worker_copy.is_set());

        handle.clear();
        assert!(!worker_copy.is_set());
    }
}
