//! Messages exchanged between workers and the pool's collector

use crate::app::acquirer::ItemReport;

/// Event reported by an acquisition worker
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A task was claimed from the queue
    Started { worker_id: u32, label: String },
    /// All tiers of a task were processed
    Finished { worker_id: u32, report: ItemReport },
    /// The worker left its loop
    Stopped { worker_id: u32, processed: u64 },
}

impl WorkerEvent {
    pub fn worker_id(&self) -> u32 {
        match self {
            Self::Started { worker_id, .. }
            | Self::Finished { worker_id, .. }
            | Self::Stopped { worker_id, .. } => *worker_id,
        }
    }
}

/// Lifecycle of a [`WorkerPool`](super::WorkerPool)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Created,
    Running,
    ShuttingDown,
    Shutdown,
}
