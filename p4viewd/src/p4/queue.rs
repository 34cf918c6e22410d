use thiserror::Error;

use super::command::BatchTarget;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("command queue is empty")]
    Empty,
}

/// Pending targets of one batch, consumed last-in-first-out.
#[derive(Debug, Default)]
pub struct CommandQueue {
    inner: Vec<BatchTarget>,
}

impl CommandQueue {
    pub fn new(targets: Vec<BatchTarget>) -> Self {
        Self { inner: targets }
    }

    pub fn enqueue(&mut self, target: BatchTarget) {
        self.inner.push(target);
    }

    /// Takes the most recently enqueued target.
    pub fn dequeue(&mut self) -> Result<BatchTarget, QueueError> {
        self.inner.pop().ok_or(QueueError::Empty)
    }

    /// Drops every pending target, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.inner.len();
        self.inner.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
