use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Aggregate counts over the durable ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Total records
    pub records: usize,
    /// Distinct content hashes
    pub distinct_content: usize,
    /// Records carrying a perceptual hash
    pub with_perceptual: usize,
    /// Records carrying at least one cache validator
    pub with_validators: usize,
    /// Sum of stored sizes in bytes (shared content counted per record)
    pub total_bytes: u64,
    /// Records per tier name
    pub by_tier: BTreeMap<String, usize>,
    /// Records per source
    pub by_source: BTreeMap<String, usize>,
}

impl fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records:            {}", self.records)?;
        writeln!(f, "Distinct contents:  {}", self.distinct_content)?;
        writeln!(f, "Perceptual hashes:  {}", self.with_perceptual)?;
        writeln!(f, "Cache validators:   {}", self.with_validators)?;
        writeln!(f, "Recorded bytes:     {}", self.total_bytes)?;
        for (tier, count) in &self.by_tier {
            writeln!(f, "  tier {:<6} {}", tier, count)?;
        }
        for (source, count) in &self.by_source {
            writeln!(f, "  source {:<12} {}", source, count)?;
        }
        Ok(())
    }
}
