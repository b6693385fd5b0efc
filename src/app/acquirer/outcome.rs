//! Per-tier and per-item results

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app::models::ResolutionTier;

/// Final state of one (item, tier) unit of work
///
/// Only `Failed` is a failure; every other variant is a successful control
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierOutcome {
    /// Fetched from `url` and persisted
    Downloaded { url: String, bytes: u64 },
    /// Produced from a resident higher tier without a network fetch
    Derived { from: ResolutionTier, bytes: u64 },
    /// Key recorded or file already on disk
    AlreadyPresent,
    /// Server confirmed the replayed validators; nothing written
    NotModified { url: String },
    DuplicateSkipped { existing: PathBuf },
    DuplicateLinked { existing: PathBuf },
    Failed { reason: String },
}

impl TierOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Bytes newly written for the primary
    pub fn bytes_written(&self) -> u64 {
        match self {
            Self::Downloaded { bytes, .. } | Self::Derived { bytes, .. } => *bytes,
            _ => 0,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Downloaded { .. } => "downloaded",
            Self::Derived { .. } => "derived",
            Self::AlreadyPresent => "present",
            Self::NotModified { .. } => "not-modified",
            Self::DuplicateSkipped { .. } => "dup-skipped",
            Self::DuplicateLinked { .. } => "dup-linked",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for TierOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Downloaded { url, .. } => write!(f, "downloaded from {}", url),
            Self::Derived { from, .. } => write!(f, "derived from {}", from),
            Self::AlreadyPresent => f.write_str("already present"),
            Self::NotModified { url } => write!(f, "not modified at {}", url),
            Self::DuplicateSkipped { existing } => {
                write!(f, "duplicate of {}, skipped", existing.display())
            }
            Self::DuplicateLinked { existing } => {
                write!(f, "duplicate of {}, linked", existing.display())
            }
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Outcomes of every tier processed for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    pub source: String,
    pub source_id: String,
    pub tiers: Vec<(ResolutionTier, TierOutcome)>,
}

impl ItemReport {
    pub fn outcome(&self, tier: ResolutionTier) -> Option<&TierOutcome> {
        self.tiers
            .iter()
            .find(|(t, _)| *t == tier)
            .map(|(_, outcome)| outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.tiers.iter().any(|(_, outcome)| outcome.is_failure())
    }

    /// One-line summary such as `feed/42 4k=downloaded 1k=derived`
    pub fn summary(&self) -> String {
        let tiers: Vec<String> = self
            .tiers
            .iter()
            .map(|(tier, outcome)| format!("{}={}", tier, outcome.kind()))
            .collect();
        format!("{}/{} {}", self.source, self.source_id, tiers.join(" "))
    }
}
