//! Bounded undo history for step-back.

use crate::ScriptCursor;
use pbftviz_reducer::ProtocolState;
use pbftviz_types::{Envelope, EventId};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::trace;

/// Where the scheduler was when a snapshot was taken.
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    /// Scripted generator position and the next local eid.
    Scripted {
        script: ScriptCursor,
        next_eid: EventId,
    },
    /// The live envelope dispatched right after the snapshot. Restoring puts
    /// it back at the head of the live queue.
    Live { replay: Envelope },
}

/// A protocol state plus the scheduler position it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: ProtocolState,
    pub cursor: Cursor,
}

/// LIFO of snapshots with FIFO eviction once `limit` is reached.
///
/// States are persistent values, so holding hundreds of snapshots costs
/// little more than the entries that differ between them.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<Snapshot>,
    limit: usize,
}

impl HistoryBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Record a snapshot, evicting the oldest one when full.
    pub fn push(&mut self, snapshot: Snapshot) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
            trace!(limit = self.limit, "History full, evicted oldest snapshot");
        }
        self.entries.push_back(snapshot);
    }

    /// Take the most recent snapshot, with every pulse re-stamped at `now`.
    ///
    /// `None` when the buffer is empty; callers treat that as a no-op.
    pub fn pop(&mut self, now: Duration) -> Option<Snapshot> {
        let snapshot = self.entries.pop_back()?;
        Some(Snapshot {
            state: snapshot.state.retimed(now),
            cursor: snapshot.cursor,
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbftviz_reducer::Action;
    use pbftviz_types::{ReplicaId, SessionConfig};

    fn scripted(next_eid: u64) -> Cursor {
        Cursor::Scripted {
            script: ScriptCursor::default(),
            next_eid: EventId(next_eid),
        }
    }

    fn busy_state() -> ProtocolState {
        ProtocolState::new()
            .reduce(Action::SessionStart {
                config: SessionConfig::new(4, 1),
            })
            .reduce(Action::Prepare {
                from: ReplicaId(1),
                to: vec![],
                at: Duration::from_millis(10),
                eid: EventId(3),
            })
    }

    #[test]
    fn test_push_pop_restores_state_with_retimed_pulses() {
        let mut history = HistoryBuffer::new(8);
        let state = busy_state();
        history.push(Snapshot {
            state: state.clone(),
            cursor: scripted(4),
        });

        let now = Duration::from_secs(5);
        let restored = history.pop(now).expect("snapshot");

        assert_eq!(restored.state, state.retimed(now));
        assert!(restored.state.pulses().iter().all(|p| p.at == now));
        assert_eq!(restored.state.prepares(), state.prepares());
        assert_eq!(restored.cursor, scripted(4));
        assert!(history.is_empty());
    }

    #[test]
    fn test_pop_empty_is_none() {
        let mut history = HistoryBuffer::new(4);
        assert!(history.pop(Duration::ZERO).is_none());
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut history = HistoryBuffer::new(3);
        for eid in 1..=5 {
            history.push(Snapshot {
                state: ProtocolState::new(),
                cursor: scripted(eid),
            });
        }
        assert_eq!(history.len(), 3);

        let order: Vec<_> = std::iter::from_fn(|| history.pop(Duration::ZERO))
            .map(|s| s.cursor)
            .collect();
        assert_eq!(order, vec![scripted(5), scripted(4), scripted(3)]);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_transitions() {
        let mut history = HistoryBuffer::new(4);
        let state = busy_state();
        history.push(Snapshot {
            state: state.clone(),
            cursor: scripted(1),
        });

        let _later = state.reduce(Action::Commit {
            from: ReplicaId(2),
            to: vec![],
            at: Duration::from_millis(20),
            eid: EventId(4),
        });

        let restored = history.pop(Duration::ZERO).expect("snapshot");
        assert!(restored.state.commits().is_empty());
    }
}
