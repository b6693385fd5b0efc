//! Candidate sources and their collection into scheduler groups
//!
//! Sources are injected by the caller as trait objects; nothing here keeps a
//! global registry. A failing source contributes zero candidates and never
//! affects the others.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use crate::app::models::{AcquisitionTask, CandidateItem, ResolutionTier};
use crate::app::scheduler::TaskGroup;
use crate::constants::workers::DEFAULT_LIMIT_PER_SOURCE;
use crate::errors::SourceResult;

pub mod feed;
pub mod robots;

#[cfg(test)]
mod tests;

pub use feed::{FeedLocation, FeedSource};
pub use robots::{AllowAll, DenyHosts, RobotsGate};

/// Free-form search options passed through to sources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Tier being searched for, `None` for chained searches
    pub tier: Option<ResolutionTier>,
    pub extra: BTreeMap<String, String>,
}

/// Uniform search capability of a candidate provider
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Stable name used in acquisition keys and paths
    fn name(&self) -> &str;

    /// Whether one task per item should cover every requested tier
    fn chains_tiers(&self) -> bool {
        false
    }

    /// Finite, ordered candidates for a query at a target size
    async fn search(
        &self,
        query: &str,
        width: u32,
        height: u32,
        limit: usize,
        options: &SearchOptions,
    ) -> SourceResult<Vec<CandidateItem>>;
}

/// Parameters shared by every search in one collection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectRequest {
    pub query: String,
    pub tiers: Vec<ResolutionTier>,
    pub limit_per_source: usize,
    pub extra: BTreeMap<String, String>,
}

impl CollectRequest {
    pub fn new(query: impl Into<String>, tiers: Vec<ResolutionTier>) -> Self {
        Self {
            query: query.into(),
            tiers,
            limit_per_source: DEFAULT_LIMIT_PER_SOURCE,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit_per_source = limit;
        self
    }
}

async fn search_group(
    source: Arc<dyn CandidateSource>,
    tier: Option<ResolutionTier>,
    request: &CollectRequest,
) -> TaskGroup {
    let tiers = ResolutionTier::ordered(&request.tiers);
    let search_tier = tier.or_else(|| tiers.first().copied()).unwrap_or(ResolutionTier::High);
    let bbox = search_tier.bounding_box();
    let options = SearchOptions {
        tier,
        extra: request.extra.clone(),
    };

    let items = match source
        .search(
            &request.query,
            bbox.width,
            bbox.height,
            request.limit_per_source,
            &options,
        )
        .await
    {
        Ok(items) => items,
        Err(e) => {
            warn!("Source {} failed, continuing without it: {}", source.name(), e);
            Vec::new()
        }
    };

    let task_tiers = match tier {
        Some(tier) => vec![tier],
        None => tiers,
    };
    let tasks = items
        .into_iter()
        .take(request.limit_per_source)
        .map(|mut item| {
            item.source = source.name().to_string();
            AcquisitionTask::new(Arc::new(item), &task_tiers)
        })
        .collect();
    TaskGroup::new(source.name(), tier, tasks)
}

/// Search every source and return groups in (source, tier) order
///
/// Chaining sources yield one group covering all tiers; the rest yield one
/// group per tier, highest fidelity first.
pub async fn collect_groups(
    sources: &[Arc<dyn CandidateSource>],
    request: &CollectRequest,
) -> Vec<TaskGroup> {
    let tiers = ResolutionTier::ordered(&request.tiers);
    let mut searches = Vec::new();
    for source in sources {
        if source.chains_tiers() {
            searches.push(search_group(source.clone(), None, request));
        } else {
            for tier in &tiers {
                searches.push(search_group(source.clone(), Some(*tier), request));
            }
        }
    }

    let groups = join_all(searches).await;
    for group in &groups {
        info!("{}: {} candidates", group.label(), group.len());
    }
    groups
}
