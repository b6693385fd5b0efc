//! Task groups as produced per source and tier

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::models::{AcquisitionTask, HostAliases, ResolutionTier};

/// Ordered tasks from one source for one tier, or for all tiers when chained
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroup {
    pub source: String,
    /// `None` for sources whose tasks chain every requested tier
    pub tier: Option<ResolutionTier>,
    pub tasks: Vec<AcquisitionTask>,
}

impl TaskGroup {
    pub fn new(
        source: impl Into<String>,
        tier: Option<ResolutionTier>,
        tasks: Vec<AcquisitionTask>,
    ) -> Self {
        Self {
            source: source.into(),
            tier,
            tasks,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// `source/tier`, or `source/*` for chained groups
    pub fn label(&self) -> String {
        match self.tier {
            Some(tier) => format!("{}/{}", self.source, tier),
            None => format!("{}/*", self.source),
        }
    }

    /// Drop tasks whose normalized URL already appeared earlier in the group
    ///
    /// Returns how many tasks were dropped.
    pub fn dedup_urls(&mut self, aliases: &HostAliases) -> usize {
        let before = self.tasks.len();
        let mut seen = HashSet::with_capacity(before);
        self.tasks
            .retain(|task| seen.insert(aliases.normalize(&task.item.url).to_string()));
        let dropped = before - self.tasks.len();
        if dropped > 0 {
            debug!("Dropped {} duplicate URLs from {}", dropped, self.label());
        }
        dropped
    }
}

/// Counts describing one scheduling pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePlan {
    pub groups: usize,
    pub tasks: usize,
    pub duplicate_urls: usize,
}
