//! Worker pool management and coordination
//!
//! The pool spawns a fixed number of workers that claim tasks from a shared
//! [`TaskQueue`] in dispatch order and report through one bounded event
//! channel. Closing the queue stops dispatch; tasks already claimed run to
//! completion.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::WorkerConfig;
use super::types::{PoolState, WorkerEvent};
use crate::app::acquirer::{Acquirer, RunSummary};
use crate::app::models::AcquisitionTask;
use crate::app::scheduler::TaskQueue;
use crate::errors::AppError;

/// Stops dispatch of further tasks from another task or a signal handler
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    queue: Arc<TaskQueue<AcquisitionTask>>,
}

impl ShutdownHandle {
    /// Close the queue; returns how many tasks will not be dispatched
    pub async fn shutdown(&self) -> usize {
        let remaining = self.queue.close().await;
        info!("Dispatch stopped, {} tasks left undispatched", remaining);
        remaining
    }

    pub fn is_shutdown(&self) -> bool {
        self.queue.is_closed()
    }
}

/// Pool of acquisition workers
#[derive(Debug)]
pub struct WorkerPool {
    config: WorkerConfig,
    acquirer: Arc<Acquirer>,
    queue: Arc<TaskQueue<AcquisitionTask>>,
    handles: Vec<JoinHandle<()>>,
    state: PoolState,
}

impl WorkerPool {
    pub fn new(config: WorkerConfig, acquirer: Arc<Acquirer>, tasks: Vec<AcquisitionTask>) -> Self {
        Self {
            config,
            acquirer,
            queue: Arc::new(TaskQueue::new(tasks)),
            handles: Vec::new(),
            state: PoolState::Created,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            queue: self.queue.clone(),
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn total_tasks(&self) -> usize {
        self.queue.total()
    }

    /// Spawn the workers; the returned receiver closes once all have stopped
    pub fn start(&mut self) -> Result<mpsc::Receiver<WorkerEvent>, AppError> {
        if self.state != PoolState::Created {
            return Err(AppError::generic(format!(
                "Cannot start pool in state {:?}",
                self.state
            )));
        }

        let (events_tx, events_rx) = mpsc::channel(self.config.event_buffer_size);
        // Never more workers than tasks
        let count = self.config.worker_count.min(self.queue.total()).max(1);
        info!("Starting {} workers for {} tasks", count, self.queue.total());

        for worker_id in 0..count {
            let worker = Worker {
                id: worker_id as u32,
                acquirer: self.acquirer.clone(),
                queue: self.queue.clone(),
                events: events_tx.clone(),
            };
            self.handles.push(tokio::spawn(worker.run()));
        }

        self.state = PoolState::Running;
        Ok(events_rx)
    }

    /// Wait for every worker to exit; returns the number that panicked
    pub async fn join(&mut self) -> usize {
        if self.state == PoolState::Running {
            self.state = PoolState::ShuttingDown;
        }
        let mut failures = 0;
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("Worker task failed: {}", e);
                failures += 1;
            }
        }
        self.state = PoolState::Shutdown;
        failures
    }

    /// Run every task to completion and aggregate the outcomes
    ///
    /// `on_event` sees each event as it arrives, in arrival order.
    pub async fn run<F>(mut self, mut on_event: F) -> Result<RunSummary, AppError>
    where
        F: FnMut(&WorkerEvent),
    {
        let mut summary = RunSummary::new();
        if self.queue.total() == 0 {
            info!("Nothing to acquire");
            summary.finish();
            return Ok(summary);
        }

        let mut events = self.start()?;
        while let Some(event) = events.recv().await {
            if let WorkerEvent::Finished { report, .. } = &event {
                summary.record(report);
            }
            on_event(&event);
        }

        let failures = self.join().await;
        if failures > 0 {
            warn!("{} workers terminated abnormally", failures);
        }
        summary.undispatched = self.queue.stats().await.remaining;
        summary.finish();
        info!(
            "Run finished: {} items, {} failed tiers, {} undispatched",
            summary.items, summary.failed, summary.undispatched
        );
        Ok(summary)
    }
}

/// One acquisition worker; claims tasks until the queue is drained or closed
struct Worker {
    id: u32,
    acquirer: Arc<Acquirer>,
    queue: Arc<TaskQueue<AcquisitionTask>>,
    events: mpsc::Sender<WorkerEvent>,
}

impl Worker {
    async fn run(self) {
        debug!("Worker {} ready for work", self.id);
        let mut processed = 0u64;

        while let Some(task) = self.queue.next_task().await {
            self.emit(WorkerEvent::Started {
                worker_id: self.id,
                label: task.label(),
            })
            .await;

            let report = self.acquirer.process(&task).await;
            processed += 1;

            self.emit(WorkerEvent::Finished {
                worker_id: self.id,
                report,
            })
            .await;
        }

        debug!("Worker {} stopping after {} tasks", self.id, processed);
        self.emit(WorkerEvent::Stopped {
            worker_id: self.id,
            processed,
        })
        .await;
    }

    async fn emit(&self, event: WorkerEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Worker {} has no event listener", self.id);
        }
    }
}
