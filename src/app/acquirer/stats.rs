//! Run summary aggregation

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::acquirer::outcome::{ItemReport, TierOutcome};

/// Counts per tier outcome across one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub items: usize,
    pub downloaded: usize,
    pub derived: usize,
    pub already_present: usize,
    pub not_modified: usize,
    pub duplicates_skipped: usize,
    pub duplicates_linked: usize,
    pub failed: usize,
    /// Bytes written to new primaries
    pub bytes_written: u64,
    /// Tasks never dispatched because the run was interrupted
    pub undispatched: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            items: 0,
            downloaded: 0,
            derived: 0,
            already_present: 0,
            not_modified: 0,
            duplicates_skipped: 0,
            duplicates_linked: 0,
            failed: 0,
            bytes_written: 0,
            undispatched: 0,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: &ItemReport) {
        self.items += 1;
        for (_, outcome) in &report.tiers {
            self.record_outcome(outcome);
        }
    }

    pub fn record_outcome(&mut self, outcome: &TierOutcome) {
        match outcome {
            TierOutcome::Downloaded { .. } => self.downloaded += 1,
            TierOutcome::Derived { .. } => self.derived += 1,
            TierOutcome::AlreadyPresent => self.already_present += 1,
            TierOutcome::NotModified { .. } => self.not_modified += 1,
            TierOutcome::DuplicateSkipped { .. } => self.duplicates_skipped += 1,
            TierOutcome::DuplicateLinked { .. } => self.duplicates_linked += 1,
            TierOutcome::Failed { .. } => self.failed += 1,
        }
        self.bytes_written += outcome.bytes_written();
    }

    /// Tier units of work processed
    pub fn total_tiers(&self) -> usize {
        self.downloaded
            + self.derived
            + self.already_present
            + self.not_modified
            + self.duplicates_skipped
            + self.duplicates_linked
            + self.failed
    }

    pub fn finish(&mut self) {
        self.elapsed = Utc::now()
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Items processed:     {}", self.items)?;
        writeln!(f, "  downloaded:        {}", self.downloaded)?;
        writeln!(f, "  derived:           {}", self.derived)?;
        writeln!(f, "  already present:   {}", self.already_present)?;
        writeln!(f, "  not modified:      {}", self.not_modified)?;
        writeln!(f, "  duplicates linked: {}", self.duplicates_linked)?;
        writeln!(f, "  duplicates skipped: {}", self.duplicates_skipped)?;
        writeln!(f, "  failed:            {}", self.failed)?;
        if self.undispatched > 0 {
            writeln!(f, "  not dispatched:    {}", self.undispatched)?;
        }
        writeln!(f, "Bytes written:       {}", self.bytes_written)?;
        write!(f, "Elapsed:             {:.1}s", self.elapsed.as_secs_f64())
    }
}
