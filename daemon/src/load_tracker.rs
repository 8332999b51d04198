//! Aggregate readiness of the attached streams (the loading gate)

use common::StreamId;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

/// Counts streams that reported ready or failed.
///
/// Every stream contributes to `loaded_count` at most once, whether it loaded,
/// errored, or was force-counted by the failsafe deadline.
#[derive(Debug)]
pub struct LoadTracker {
    expected: HashSet<StreamId>,
    accounted: HashSet<StreamId>,
    loaded_count: usize,
    total_to_load: usize,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl LoadTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            expected: HashSet::new(),
            accounted: HashSet::new(),
            loaded_count: 0,
            total_to_load: 0,
            timeout,
            deadline: None,
        }
    }

    /// Start a fresh load round for `expected` (streams with a resolved source)
    pub fn reset<I>(&mut self, expected: I, now: Instant)
    where
        I: IntoIterator<Item = StreamId>,
    {
        self.expected = expected.into_iter().collect();
        self.accounted.clear();
        self.loaded_count = 0;
        self.total_to_load = self.expected.len();
        self.deadline = (self.total_to_load > 0).then(|| now + self.timeout);
    }

    /// Returns `true` if this call accounted for the stream
    pub fn mark_loaded(&mut self, id: &StreamId) -> bool {
        self.account(id)
    }

    /// A failed stream counts as loaded so the gate cannot hang on it
    pub fn mark_errored(&mut self, id: &StreamId) -> bool {
        self.account(id)
    }

    fn account(&mut self, id: &StreamId) -> bool {
        if !self.expected.contains(id) || !self.accounted.insert(id.clone()) {
            return false;
        }
        self.loaded_count += 1;
        if self.all_loaded() {
            self.deadline = None;
        }
        true
    }

    /// Force-count every stream still pending. Returns the ids that timed out.
    pub fn expire(&mut self) -> Vec<StreamId> {
        self.deadline = None;
        let mut pending: Vec<StreamId> = self
            .expected
            .difference(&self.accounted)
            .cloned()
            .collect();
        pending.sort();
        for id in &pending {
            self.account(id);
        }
        pending
    }

    /// When the failsafe fires, if a load round is still open
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Stop the failsafe without counting anything
    pub fn clear(&mut self) {
        self.expected.clear();
        self.accounted.clear();
        self.loaded_count = 0;
        self.total_to_load = 0;
        self.deadline = None;
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded_count
    }

    pub fn total_to_load(&self) -> usize {
        self.total_to_load
    }

    pub fn all_loaded(&self) -> bool {
        self.total_to_load == 0 || self.loaded_count >= self.total_to_load
    }
}
