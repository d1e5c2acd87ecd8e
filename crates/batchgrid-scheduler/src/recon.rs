//! `ReconciliationTracker` — task IDs whose terminal state is not yet confirmed.
//!
//! An ID stays tracked until a status update for it arrives or its agent
//! is declared lost. The reconciliation worker keeps asking the cluster
//! manager about every tracked ID until then.

use std::collections::BTreeSet;
use std::sync::Mutex;

use tracing::debug;

pub struct ReconciliationTracker {
    task_ids: Mutex<BTreeSet<String>>,
}

impl ReconciliationTracker {
    pub fn new() -> Self {
        Self {
            task_ids: Mutex::new(BTreeSet::new()),
        }
    }

    /// Track task IDs; IDs already tracked are unaffected.
    pub fn add_task_ids<I, S>(&self, task_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tracked = self.task_ids.lock().expect("recon lock");
        for task_id in task_ids {
            let task_id = task_id.into();
            if tracked.insert(task_id.clone()) {
                debug!(%task_id, "task added to reconciliation");
            }
        }
    }

    /// Stop tracking a task. Returns whether it was tracked.
    pub fn remove_task_id(&self, task_id: &str) -> bool {
        let removed = self.task_ids.lock().expect("recon lock").remove(task_id);
        if removed {
            debug!(%task_id, "task removed from reconciliation");
        }
        removed
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.task_ids.lock().expect("recon lock").contains(task_id)
    }

    /// Tracked IDs in sorted order.
    pub fn task_ids(&self) -> Vec<String> {
        self.task_ids
            .lock()
            .expect("recon lock")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.task_ids.lock().expect("recon lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReconciliationTracker {
    fn default() -> Self {
        Self::new()
    }
}
