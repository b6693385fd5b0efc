//! Round-robin merge of task groups

use std::collections::VecDeque;

/// Merge `groups` into one sequence, taking one task per non-empty group per round
///
/// Groups are visited in their given order and dropped once drained. The
/// result is a permutation of the input that keeps each group's order.
pub fn interleave<T>(groups: Vec<Vec<T>>) -> Vec<T> {
    let total = groups.iter().map(Vec::len).sum();
    let mut queues: VecDeque<VecDeque<T>> = groups
        .into_iter()
        .filter(|group| !group.is_empty())
        .map(VecDeque::from)
        .collect();

    let mut ordered = Vec::with_capacity(total);
    while let Some(mut queue) = queues.pop_front() {
        if let Some(task) = queue.pop_front() {
            ordered.push(task);
        }
        if !queue.is_empty() {
            queues.push_back(queue);
        }
    }
    ordered
}
