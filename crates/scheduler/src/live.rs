//! Pending envelopes waiting to be released in live mode.

use pbftviz_types::Envelope;
use std::collections::VecDeque;

/// FIFO of received envelopes.
///
/// Unbounded: a paused scheduler keeps accumulating and never drops. The
/// length is exposed so callers can watch the backlog.
#[derive(Debug, Clone, Default)]
pub struct LiveQueue {
    pending: VecDeque<Envelope>,
}

impl LiveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received envelope.
    pub fn push(&mut self, envelope: Envelope) {
        self.pending.push_back(envelope);
    }

    /// Put an envelope back at the head (used when stepping back over it).
    pub fn push_front(&mut self, envelope: Envelope) {
        self.pending.push_front(envelope);
    }

    /// Take the oldest envelope.
    pub fn pop(&mut self) -> Option<Envelope> {
        self.pending.pop_front()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
