//! Debounced, coalescing buffer of edited tasks awaiting write-back.

use std::time::Duration;

use tokio::time::Instant;

use crate::model::Task;

#[derive(Debug, Clone)]
pub struct WriteBackScheduler {
    window: Duration,
    pending: Vec<Task>,
    deadline: Option<Instant>,
}

impl WriteBackScheduler {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            deadline: None,
        }
    }

    /// Buffer `task` and restart the quiet period. A later edit to the same
    /// identifier replaces the earlier one in place.
    pub fn enqueue(&mut self, task: Task, now: Instant) {
        let Some(id) = task.key() else {
            return;
        };
        match self
            .pending
            .iter_mut()
            .find(|queued| queued.key() == Some(id))
        {
            Some(slot) => *slot = task,
            None => self.pending.push(task),
        }
        self.deadline = Some(now + self.window);
    }

    /// Swap in a newer value for an already buffered task without touching
    /// the timer. Returns `false` when nothing was buffered for it.
    pub fn supersede(&mut self, task: Task) -> bool {
        let Some(id) = task.key() else {
            return false;
        };
        match self
            .pending
            .iter_mut()
            .find(|queued| queued.key() == Some(id))
        {
            Some(slot) => {
                *slot = task;
                true
            }
            None => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Drain the buffer once the quiet period has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<Vec<Task>> {
        if !self.is_due(now) {
            return None;
        }
        self.deadline = None;
        Some(std::mem::take(&mut self.pending))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.iter().any(|task| task.key() == Some(id))
    }

    /// Drop a buffered edit for a task that no longer exists.
    pub fn discard(&mut self, id: &str) {
        self.pending.retain(|task| task.key() != Some(id));
        if self.pending.is_empty() {
            self.deadline = None;
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
