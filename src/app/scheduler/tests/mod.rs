//! Scheduling fairness and queue behaviour

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use super::*;
use crate::app::models::{AcquisitionTask, CandidateItem, HostAliases, ResolutionTier};

fn task(source: &str, n: usize) -> AcquisitionTask {
    let url = Url::parse(&format!("https://{}.example.com/{}.jpg", source, n)).unwrap();
    let item = CandidateItem::new(source, n.to_string(), url);
    AcquisitionTask::new(Arc::new(item), &[ResolutionTier::Low])
}

fn group(source: &str, size: usize) -> TaskGroup {
    TaskGroup::new(
        source,
        Some(ResolutionTier::Low),
        (0..size).map(|n| task(source, n)).collect(),
    )
}

#[test]
fn test_fairness_for_uneven_groups() {
    let (tasks, plan) = schedule(
        vec![group("a", 5), group("b", 1), group("c", 3)],
        &HostAliases::default(),
    );
    assert_eq!(plan.tasks, 9);
    assert_eq!(plan.groups, 3);

    let sources: Vec<&str> = tasks.iter().map(|t| t.item.source.as_str()).collect();
    let first_three: std::collections::HashSet<_> = sources[..3].iter().collect();
    assert_eq!(first_three.len(), 3);

    // Each group's internal order survives
    for source in ["a", "b", "c"] {
        let ids: Vec<usize> = tasks
            .iter()
            .filter(|t| t.item.source == source)
            .map(|t| t.item.source_id.parse().unwrap())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}

#[test]
fn test_interleave_is_a_permutation() {
    let groups: Vec<Vec<(usize, usize)>> = (0..6)
        .map(|g| (0..(g * 3 % 7)).map(|i| (g, i)).collect())
        .collect();
    let mut expected: Vec<_> = groups.iter().flatten().copied().collect();
    let mut out = interleave(groups);
    assert_eq!(out.len(), expected.len());
    out.sort();
    expected.sort();
    assert_eq!(out, expected);
}

#[test]
fn test_no_group_starved_while_others_pending() {
    let out = interleave(vec![vec![0; 10], vec![1; 2], vec![2; 4]]);
    // Until a group drains, every round contains one task per live group
    assert_eq!(&out[..3], &[0, 1, 2]);
    assert_eq!(&out[3..6], &[0, 1, 2]);
    assert_eq!(&out[6..8], &[0, 2]);
}

#[test]
fn test_dedup_urls_within_group_only() {
    let aliases = HostAliases::new(HashMap::from([(
        "mirror.example.com".to_string(),
        "a.example.com".to_string(),
    )]));
    let mut dup = task("a", 0);
    Arc::make_mut(&mut dup.item).url =
        Url::parse("https://mirror.example.com/0.jpg#x").unwrap();
    let mut a = group("a", 2);
    a.tasks.push(dup);
    let b = TaskGroup::new("b", Some(ResolutionTier::Low), vec![task("a", 0)]);

    let (tasks, plan) = schedule(vec![a, b, group("empty", 0)], &aliases);
    assert_eq!(plan.duplicate_urls, 1);
    assert_eq!(plan.groups, 2);
    assert_eq!(tasks.len(), 3);
}

#[test]
fn test_group_label() {
    assert_eq!(group("feed", 0).label(), "feed/1k");
    assert_eq!(TaskGroup::new("feed", None, Vec::new()).label(), "feed/*");
}

#[tokio::test]
async fn test_queue_dispatches_in_order_until_closed() {
    let queue = TaskQueue::new(vec![1, 2, 3, 4]);
    assert_eq!(queue.next_task().await, Some(1));
    assert_eq!(queue.next_task().await, Some(2));

    assert_eq!(queue.close().await, 2);
    assert_eq!(queue.next_task().await, None);

    let stats = queue.stats().await;
    assert_eq!(stats.total, 4);
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.remaining, 2);
    assert!(stats.closed);
}

#[tokio::test]
async fn test_queue_shared_between_workers() {
    let queue = Arc::new(TaskQueue::new((0..50).collect::<Vec<u32>>()));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(n) = queue.next_task().await {
                claimed.push(n);
            }
            claimed
        }));
    }
    let mut all = Vec::new();
    for handle in handles {
        let claimed = handle.await.unwrap();
        let mut sorted = claimed.clone();
        sorted.sort();
        assert_eq!(claimed, sorted);
        all.extend(claimed);
    }
    all.sort();
    assert_eq!(all, (0..50).collect::<Vec<u32>>());
}
