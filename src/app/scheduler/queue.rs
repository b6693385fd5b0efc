//! Shared dispatch queue drained by acquisition workers

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

/// Snapshot of queue progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub dispatched: usize,
    pub remaining: usize,
    pub closed: bool,
}

/// FIFO of already-interleaved tasks
///
/// Workers claim from the front so dispatch follows scheduling order.
/// Closing the queue stops further dispatch; tasks already claimed are
/// unaffected.
#[derive(Debug)]
pub struct TaskQueue<T> {
    tasks: Arc<Mutex<VecDeque<T>>>,
    total: usize,
    dispatched: AtomicUsize,
    closed: AtomicBool,
}

impl<T> TaskQueue<T> {
    pub fn new(tasks: Vec<T>) -> Self {
        let total = tasks.len();
        Self {
            tasks: Arc::new(Mutex::new(VecDeque::from(tasks))),
            total,
            dispatched: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Claim the next task, or `None` once drained or closed
    pub async fn next_task(&self) -> Option<T> {
        if self.is_closed() {
            return None;
        }
        let task = self.tasks.lock().await.pop_front();
        if task.is_some() {
            self.dispatched.fetch_add(1, Ordering::Relaxed);
        }
        task
    }

    /// Stop dispatching; returns how many tasks were left undispatched
    pub async fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let remaining = self.tasks.lock().await.len();
        debug!("Task queue closed with {} undispatched tasks", remaining);
        remaining
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub async fn stats(&self) -> QueueStats {
        let remaining = self.tasks.lock().await.len();
        QueueStats {
            total: self.total,
            dispatched: self.dispatched.load(Ordering::Relaxed),
            remaining,
            closed: self.is_closed(),
        }
    }
}
