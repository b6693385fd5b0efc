//! Bounded worker pool executing scheduled acquisition tasks
//!
//! Workers claim tasks from a shared queue in the scheduler's dispatch order
//! and never wait on one another; throughput is bounded further by the
//! transport's in-flight permits, which never exceed the worker count.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wallpaper_fetcher::app::worker::{WorkerConfig, WorkerPool, install_shutdown_handler};
//! # use wallpaper_fetcher::app::acquirer::Acquirer;
//! # use wallpaper_fetcher::app::models::AcquisitionTask;
//!
//! # async fn example(acquirer: Arc<Acquirer>, tasks: Vec<AcquisitionTask>) -> wallpaper_fetcher::Result<()> {
//! let pool = WorkerPool::new(WorkerConfig::default(), acquirer, tasks);
//! let signals = install_shutdown_handler(pool.shutdown_handle());
//! let summary = pool.run(|event| println!("{:?}", event)).await?;
//! signals.abort();
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod pool;
pub mod signals;
pub mod types;


pub use config::WorkerConfig;
pub use pool::{ShutdownHandle, WorkerPool};
pub use signals::install_shutdown_handler;
pub use types::{PoolState, WorkerEvent};
