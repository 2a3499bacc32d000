//! Rolling envelope log.

use pbftviz_types::{Envelope, EventId};
use std::collections::VecDeque;

/// The most recent `limit` envelopes, oldest first.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<Envelope>,
    limit: usize,
}

impl EventLog {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, envelope: Envelope) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(envelope);
    }

    /// Logged envelopes with `eid >= from`, in order.
    pub fn since(&self, from: EventId) -> Vec<Envelope> {
        // Eids are assigned in order, so the log is sorted.
        let start = self.entries.partition_point(|e| e.eid < from);
        self.entries.range(start..).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest eid still available for replay.
    pub fn first_eid(&self) -> Option<EventId> {
        self.entries.front().map(|e| e.eid)
    }
}
