//! Buffer of task status updates waiting to be written to storage.

use std::collections::VecDeque;
use std::sync::Mutex;

use batchgrid_state::TaskUpdate;

pub struct TaskUpdateQueue {
    updates: Mutex<VecDeque<TaskUpdate>>,
}

impl TaskUpdateQueue {
    pub fn new() -> Self {
        Self {
            updates: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, update: TaskUpdate) {
        self.updates.lock().expect("updates lock").push_back(update);
    }

    /// Take every buffered update, oldest first.
    pub fn drain(&self) -> Vec<TaskUpdate> {
        self.updates.lock().expect("updates lock").drain(..).collect()
    }

    /// Put updates that could not be stored back at the front, keeping their order.
    pub fn requeue(&self, updates: Vec<TaskUpdate>) {
        let mut queue = self.updates.lock().expect("updates lock");
        for update in updates.into_iter().rev() {
            queue.push_front(update);
        }
    }

    pub fn len(&self) -> usize {
        self.updates.lock().expect("updates lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskUpdateQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchgrid_state::TaskState;

    fn update(task_id: &str, timestamp: u64) -> TaskUpdate {
        TaskUpdate {
            task_id: task_id.to_string(),
            agent_id: "a1".to_string(),
            state: TaskState::Running,
            timestamp,
            exit_code: None,
            message: None,
        }
    }

    #[test]
    fn requeue_keeps_order_ahead_of_new_updates() {
        let queue = TaskUpdateQueue::new();
        queue.push(update("1_main", 1));
        queue.push(update("2_main", 2));

        let taken = queue.drain();
        assert!(queue.is_empty());
        queue.push(update("3_main", 3));
        queue.requeue(taken);

        let order: Vec<u64> = queue.drain().iter().map(|u| u.timestamp).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
