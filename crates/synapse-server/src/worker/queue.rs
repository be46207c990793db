use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// Pending analysis work. Deduplicates by document id so a duplicate
/// `document_created` delivery enqueues a single run.
pub struct DocumentQueue {
    queue: Mutex<VecDeque<Uuid>>,
    max_size: usize,
}

impl DocumentQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            max_size,
        }
    }

    /// Returns false when the id was already queued.
    pub async fn enqueue(&self, document_id: Uuid) -> bool {
        let mut queue = self.queue.lock().await;

        if queue.iter().any(|id| *id == document_id) {
            return false;
        }

        if queue.len() >= self.max_size {
            if let Some(dropped) = queue.pop_front() {
                warn!("Queue full, dropping oldest pending document {}", dropped);
            }
        }

        queue.push_back(document_id);
        true
    }

    pub async fn dequeue(&self) -> Option<Uuid> {
        let mut queue = self.queue.lock().await;
        queue.pop_front()
    }

    pub async fn size(&self) -> usize {
        let queue = self.queue.lock().await;
        queue.len()
    }
}
