//! Commonly used items in one import
//!
//! ```rust,no_run
//! use wallpaper_fetcher::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let layout = PathLayout::new("wallpapers");
//! let ledger = Arc::new(Ledger::open(layout.ledger_path())?);
//! let transport = Arc::new(Transport::new()?);
//! let acquirer = Acquirer::new(transport, ledger, layout, AcquirerConfig::default());
//! # let _ = acquirer;
//! # Ok(())
//! # }
//! ```

pub use crate::errors::{AppError, Result};

pub use crate::app::{
    AcquisitionKey, AcquisitionTask, Acquirer, AcquirerConfig, CandidateItem, CandidateSource,
    CollectRequest, DeriveMode, DupAction, DupMode, FeedSource, ItemReport, Ledger, PathLayout,
    ResolutionTier, RunSummary, TierOutcome, Transport, TransportConfig, WorkerConfig,
    WorkerPool, collect_groups, schedule,
};
pub use crate::config::AppConfig;

pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
