//! # Priority Queue
//!
//! Five FIFO buckets of orchestrations awaiting admission. An orchestration id
//! lives in at most one bucket at a time.

use std::collections::{BTreeMap, VecDeque};

use crate::constants::priority;
use crate::models::{OrchestrationId, Priority};

#[derive(Debug, Default)]
pub struct PriorityQueue {
    buckets: [VecDeque<OrchestrationId>; priority::LEVELS],
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the bucket for `priority`, moving the id out of any other bucket.
    /// Re-enqueueing into the same bucket keeps its position.
    pub fn enqueue(&mut self, id: OrchestrationId, priority: Priority) {
        if self.priority_of(id) == Some(priority) {
            return;
        }
        self.remove(id);
        self.buckets[priority.bucket_index()].push_back(id);
    }

    /// Remove an id from whichever bucket holds it
    pub fn remove(&mut self, id: OrchestrationId) -> Option<Priority> {
        for (index, bucket) in self.buckets.iter_mut().enumerate() {
            if let Some(position) = bucket.iter().position(|queued| *queued == id) {
                bucket.remove(position);
                return Some(Priority::clamped(index as i64 + 1));
            }
        }
        None
    }

    /// Move an id to a new bucket; no-op when it is not queued
    pub fn reprioritize(&mut self, id: OrchestrationId, new_priority: Priority) -> bool {
        match self.priority_of(id) {
            Some(current) if current != new_priority => {
                self.remove(id);
                self.buckets[new_priority.bucket_index()].push_back(id);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: OrchestrationId) -> bool {
        self.priority_of(id).is_some()
    }

    pub fn priority_of(&self, id: OrchestrationId) -> Option<Priority> {
        self.buckets
            .iter()
            .position(|bucket| bucket.contains(&id))
            .map(|index| Priority::clamped(index as i64 + 1))
    }

    /// Snapshot of one bucket in queue order
    pub fn bucket(&self, priority: Priority) -> Vec<OrchestrationId> {
        self.buckets[priority.bucket_index()].iter().copied().collect()
    }

    /// Whether priority 1 or 2 has waiting entries
    pub fn has_urgent(&self) -> bool {
        self.buckets[..2].iter().any(|bucket| !bucket.is_empty())
    }

    /// Bucket lengths keyed by priority level
    pub fn lengths(&self) -> BTreeMap<u8, usize> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(index, bucket)| (index as u8 + priority::HIGHEST, bucket.len()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.buckets.iter_mut().for_each(VecDeque::clear);
    }
}
