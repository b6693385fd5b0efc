//! Fair scheduling of acquisition work
//!
//! Sources contribute one [`TaskGroup`] per (source, tier) pair, or one
//! chained group per source. [`schedule`] deduplicates URLs inside each
//! group and merges the groups round-robin with [`interleave`], so a large
//! or slow source cannot starve the others once the sequence is handed to
//! the worker pool through a [`TaskQueue`].

pub mod group;
pub mod interleave;
pub mod queue;

#[cfg(test)]
mod tests;

pub use group::{SchedulePlan, TaskGroup};
pub use interleave::interleave;
pub use queue::{QueueStats, TaskQueue};

use tracing::info;

use crate::app::models::{AcquisitionTask, HostAliases};

/// Dedup each group's URLs and produce one fair dispatch order
pub fn schedule(
    groups: Vec<TaskGroup>,
    aliases: &HostAliases,
) -> (Vec<AcquisitionTask>, SchedulePlan) {
    let mut plan = SchedulePlan::default();
    let mut ordered_groups = Vec::with_capacity(groups.len());
    for mut group in groups {
        plan.duplicate_urls += group.dedup_urls(aliases);
        if group.is_empty() {
            continue;
        }
        plan.groups += 1;
        ordered_groups.push(group.tasks);
    }

    let tasks = interleave(ordered_groups);
    plan.tasks = tasks.len();
    info!(
        "Scheduled {} tasks from {} groups ({} duplicate URLs dropped)",
        plan.tasks, plan.groups, plan.duplicate_urls
    );
    (tasks, plan)
}
