//! Mock task queue for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::queue::{QueueError, SubtaskMessage, TaskQueue};
use crate::ticket::SubtaskKind;

/// Mock implementation of the TaskQueue trait.
///
/// Messages are recorded instead of delivered, so tests decide when (and
/// how often) each one reaches a handler. Enqueue failures can be injected
/// for every message or for particular subtasks.
pub struct MockTaskQueue {
    enqueued: Arc<RwLock<Vec<SubtaskMessage>>>,
    rejected_subtasks: Arc<RwLock<HashSet<SubtaskKind>>>,
    unavailable: Arc<RwLock<bool>>,
    attempts: Arc<RwLock<usize>>,
}

impl std::fmt::Debug for MockTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTaskQueue")
            .field("enqueued", &"<messages>")
            .finish()
    }
}

impl Default for MockTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskQueue {
    pub fn new() -> Self {
        Self {
            enqueued: Arc::new(RwLock::new(Vec::new())),
            rejected_subtasks: Arc::new(RwLock::new(HashSet::new())),
            unavailable: Arc::new(RwLock::new(false)),
            attempts: Arc::new(RwLock::new(0)),
        }
    }

    /// Reject every enqueue while set.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    /// Reject enqueues for one subtask.
    pub async fn reject_subtask(&self, kind: SubtaskKind) {
        self.rejected_subtasks.write().await.insert(kind);
    }

    /// Messages accepted so far, in order.
    pub async fn enqueued(&self) -> Vec<SubtaskMessage> {
        self.enqueued.read().await.clone()
    }

    /// Remove and return all accepted messages.
    pub async fn drain(&self) -> Vec<SubtaskMessage> {
        std::mem::take(&mut *self.enqueued.write().await)
    }

    /// Number of enqueue calls, accepted or not.
    pub async fn attempt_count(&self) -> usize {
        *self.attempts.read().await
    }
}

#[async_trait]
impl TaskQueue for MockTaskQueue {
    async fn enqueue(&self, message: SubtaskMessage) -> Result<(), QueueError> {
        *self.attempts.write().await += 1;

        if *self.unavailable.read().await {
            return Err(QueueError::Backend("queue unavailable".to_string()));
        }
        if self.rejected_subtasks.read().await.contains(&message.subtask) {
            return Err(QueueError::Backend(format!(
                "{} rejected",
                message.subtask
            )));
        }

        self.enqueued.write().await.push(message);
        Ok(())
    }
}
