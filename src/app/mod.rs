//! Core acquisition engine
//!
//! Sources produce [`CandidateItem`]s, the scheduler merges them into one
//! fair task sequence, and a pool of workers runs each task through the
//! [`Acquirer`] state machine, which fetches, derives, deduplicates and
//! persists artifacts while recording them in the [`Ledger`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wallpaper_fetcher::app::{
//!     collect_groups, schedule, Acquirer, AcquirerConfig, CandidateSource, CollectRequest,
//!     FeedSource, Ledger, PathLayout, ResolutionTier, Transport, WorkerConfig, WorkerPool,
//! };
//!
//! # async fn example() -> wallpaper_fetcher::Result<()> {
//! let transport = Arc::new(Transport::new()?);
//! let layout = PathLayout::new("wallpapers");
//! let ledger = Arc::new(Ledger::open(layout.ledger_path())?);
//! let config = AcquirerConfig::default();
//!
//! let sources: Vec<Arc<dyn CandidateSource>> =
//!     vec![Arc::new(FeedSource::from_file("local", "feed.json"))];
//! let request = CollectRequest::new("", ResolutionTier::ALL.to_vec());
//! let groups = collect_groups(&sources, &request).await;
//! let (tasks, _plan) = schedule(groups, &config.aliases);
//!
//! let acquirer = Arc::new(Acquirer::new(transport, ledger, layout, config));
//! let summary = WorkerPool::new(WorkerConfig::default(), acquirer, tasks)
//!     .run(|_| {})
//!     .await?;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```

pub mod acquirer;
pub mod client;
pub mod hash;
pub mod ledger;
pub mod models;
pub mod normalizer;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use acquirer::{
    Acquirer, AcquirerConfig, DeriveMode, DupAction, DupMode, ItemReport, RunSummary, TierOutcome,
};
pub use client::{ProbeOutcome, Transport, TransportConfig};
pub use hash::{ContentHash, PerceptualHash};
pub use ledger::{Ledger, LedgerStats};
pub use models::{
    AcquisitionKey, AcquisitionTask, CacheValidators, CandidateItem, HostAliases, LedgerRecord,
    ResolutionTier,
};
pub use normalizer::Normalizer;
pub use scheduler::{SchedulePlan, TaskGroup, TaskQueue, interleave, schedule};
pub use source::{
    AllowAll, CandidateSource, CollectRequest, DenyHosts, FeedLocation, FeedSource, RobotsGate,
    SearchOptions, collect_groups,
};
pub use store::{KeywordClassifier, MirrorWriter, PathLayout};
pub use worker::{WorkerConfig, WorkerEvent, WorkerPool};
