//! Scripted happy-path generator.
//!
//! The generator is a tagged cursor `{stage, replica, seq}` moved forward by
//! the pure [`advance`] function. Each call emits exactly one protocol event.
//! Stages with nobody left to speak are skipped inside the same call, so a
//! tick never produces an empty step.

use pbftviz_types::{Envelope, EventId, EventType, Participant, ReplicaId, SeqNum};
use std::collections::BTreeSet;
use std::time::Duration;

/// Session id stamped on locally generated envelopes.
pub const LOCAL_SID: &str = "local";

/// Stage of the scripted cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScriptStage {
    #[default]
    Client,
    PrePrepare,
    Prepare,
    Commit,
    Reply,
}

impl ScriptStage {
    fn is_per_replica(self) -> bool {
        matches!(
            self,
            ScriptStage::Prepare | ScriptStage::Commit | ScriptStage::Reply
        )
    }
}

/// Position inside the scripted cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptCursor {
    pub stage: ScriptStage,
    /// Next replica to consider in per-replica stages.
    pub replica: u32,
    /// Sequence number of the current round.
    pub seq: SeqNum,
}

impl Default for ScriptCursor {
    fn default() -> Self {
        Self {
            stage: ScriptStage::Client,
            replica: 0,
            seq: SeqNum(1),
        }
    }
}

impl ScriptCursor {
    /// Move to the first replica of the stage after the current one.
    fn next_stage(self) -> Self {
        match self.stage {
            ScriptStage::Client => Self {
                stage: ScriptStage::PrePrepare,
                ..self
            },
            ScriptStage::PrePrepare => Self {
                stage: ScriptStage::Prepare,
                replica: 0,
                ..self
            },
            ScriptStage::Prepare => Self {
                stage: ScriptStage::Commit,
                replica: 0,
                ..self
            },
            ScriptStage::Commit => Self {
                stage: ScriptStage::Reply,
                replica: 0,
                ..self
            },
            ScriptStage::Reply => Self {
                stage: ScriptStage::Client,
                replica: 0,
                seq: self.seq.next(),
            },
        }
    }
}

/// Cluster shape the script runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    n: u32,
    faulty: BTreeSet<ReplicaId>,
}

impl Script {
    pub fn new(n: u32, faulty: BTreeSet<ReplicaId>) -> Self {
        Self {
            n: n.max(1),
            faulty,
        }
    }

    /// Script without faulty replicas.
    pub fn honest(n: u32) -> Self {
        Self::new(n, BTreeSet::new())
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    /// Whether `replica` speaks in `stage`.
    ///
    /// Faulty replicas are silent everywhere; the primary does not send PREPARE.
    pub fn speaks(&self, stage: ScriptStage, replica: ReplicaId) -> bool {
        if self.faulty.contains(&replica) {
            return false;
        }
        match stage {
            ScriptStage::Prepare => !replica.is_primary(),
            ScriptStage::Commit | ScriptStage::Reply => true,
            ScriptStage::Client | ScriptStage::PrePrepare => false,
        }
    }

    fn next_speaker(&self, stage: ScriptStage, from: u32) -> Option<ReplicaId> {
        (from..self.n)
            .map(ReplicaId)
            .find(|&r| self.speaks(stage, r))
    }

    /// Skip forward over per-replica stages that have nobody left to speak.
    fn settle(&self, mut cursor: ScriptCursor) -> ScriptCursor {
        while cursor.stage.is_per_replica()
            && self.next_speaker(cursor.stage, cursor.replica).is_none()
        {
            cursor = cursor.next_stage();
        }
        cursor
    }
}

/// One event produced by the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedEvent {
    ClientRequest { seq: SeqNum },
    PrePrepare { seq: SeqNum, to: Vec<ReplicaId> },
    Prepare { seq: SeqNum, from: ReplicaId },
    Commit { seq: SeqNum, from: ReplicaId },
    Reply { seq: SeqNum, from: ReplicaId },
}

impl ScriptedEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            ScriptedEvent::ClientRequest { .. } => EventType::ClientRequest,
            ScriptedEvent::PrePrepare { .. } => EventType::PrePrepare,
            ScriptedEvent::Prepare { .. } => EventType::Prepare,
            ScriptedEvent::Commit { .. } => EventType::Commit,
            ScriptedEvent::Reply { .. } => EventType::Reply,
        }
    }

    /// Replica that sent the event, if any.
    pub fn sender(&self) -> Option<ReplicaId> {
        match self {
            ScriptedEvent::ClientRequest { .. } => None,
            ScriptedEvent::PrePrepare { .. } => Some(ReplicaId::PRIMARY),
            ScriptedEvent::Prepare { from, .. }
            | ScriptedEvent::Commit { from, .. }
            | ScriptedEvent::Reply { from, .. } => Some(*from),
        }
    }

    /// Build the wire envelope a live source would send for this event.
    pub fn to_envelope(&self, eid: EventId, ts: Duration, sid: &str) -> Envelope {
        let (seq, from, to) = match self {
            ScriptedEvent::ClientRequest { seq } => (
                *seq,
                Participant::Client,
                vec![Participant::Replica(ReplicaId::PRIMARY)],
            ),
            ScriptedEvent::PrePrepare { seq, to } => (
                *seq,
                Participant::Replica(ReplicaId::PRIMARY),
                to.iter().copied().map(Participant::Replica).collect(),
            ),
            ScriptedEvent::Prepare { seq, from } | ScriptedEvent::Commit { seq, from } => {
                (*seq, Participant::Replica(*from), vec![])
            }
            ScriptedEvent::Reply { seq, from } => (
                *seq,
                Participant::Replica(*from),
                vec![Participant::Client],
            ),
        };
        Envelope::new(self.event_type(), eid, seq, from, &to)
            .with_ts(ts.as_micros() as u64)
            .with_sid(sid)
    }
}

/// Produce the next scripted event and the cursor after it.
///
/// Exactly one event per call. PREPARE skips the primary and faulty
/// replicas, COMMIT and REPLY skip faulty replicas, and after the last REPLY
/// the cursor wraps to the next client request with `seq + 1`.
pub fn advance(cursor: ScriptCursor, script: &Script) -> (ScriptCursor, ScriptedEvent) {
    // A cursor built before the faulty set changed may point at an empty stage.
    let cursor = script.settle(cursor);
    let seq = cursor.seq;

    match cursor.stage {
        ScriptStage::Client => (
            cursor.next_stage(),
            ScriptedEvent::ClientRequest { seq },
        ),
        ScriptStage::PrePrepare => {
            let to = (1..script.n).map(ReplicaId).collect();
            (
                script.settle(cursor.next_stage()),
                ScriptedEvent::PrePrepare { seq, to },
            )
        }
        stage => {
            // settle() guarantees a speaker exists here.
            let from = script
                .next_speaker(stage, cursor.replica)
                .unwrap_or(ReplicaId(cursor.replica));
            let after = script.settle(ScriptCursor {
                replica: from.0 + 1,
                ..cursor
            });
            let event = match stage {
                ScriptStage::Prepare => ScriptedEvent::Prepare { seq, from },
                ScriptStage::Commit => ScriptedEvent::Commit { seq, from },
                _ => ScriptedEvent::Reply { seq, from },
            };
            (after, event)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(script: &Script, steps: usize) -> Vec<ScriptedEvent> {
        let mut cursor = ScriptCursor::default();
        let mut out = Vec::new();
        for _ in 0..steps {
            let (next, event) = advance(cursor, script);
            cursor = next;
            out.push(event);
        }
        out
    }

    fn speakers(events: &[ScriptedEvent], event_type: EventType) -> Vec<u32> {
        events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .filter_map(|e| e.sender())
            .map(|r| r.0)
            .collect()
    }

    #[test]
    fn test_full_cycle_n4() {
        let events = cycle(&Script::honest(4), 14);

        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        let mut expected = vec![EventType::ClientRequest, EventType::PrePrepare];
        expected.extend([EventType::Prepare; 3]);
        expected.extend([EventType::Commit; 4]);
        expected.extend([EventType::Reply; 4]);
        expected.push(EventType::ClientRequest);
        assert_eq!(types, expected);

        assert_eq!(speakers(&events, EventType::Prepare), vec![1, 2, 3]);
        assert_eq!(speakers(&events, EventType::Commit), vec![0, 1, 2, 3]);
        assert_eq!(speakers(&events, EventType::Reply), vec![0, 1, 2, 3]);
        assert_eq!(events[13], ScriptedEvent::ClientRequest { seq: SeqNum(2) });
    }

    #[test]
    fn test_faulty_replica_is_silent() {
        let script = Script::new(4, BTreeSet::from([ReplicaId(2)]));
        let events = cycle(&script, 11);

        assert_eq!(speakers(&events, EventType::Prepare), vec![1, 3]);
        assert_eq!(speakers(&events, EventType::Commit), vec![0, 1, 3]);
        assert_eq!(speakers(&events, EventType::Reply), vec![0, 1, 3]);
        assert_eq!(events[10], ScriptedEvent::ClientRequest { seq: SeqNum(2) });
    }

    #[test]
    fn test_pre_prepare_targets_every_backup() {
        let script = Script::new(4, BTreeSet::from([ReplicaId(3)]));
        let events = cycle(&script, 2);
        assert_eq!(
            events[1],
            ScriptedEvent::PrePrepare {
                seq: SeqNum(1),
                to: vec![ReplicaId(1), ReplicaId(2), ReplicaId(3)],
            }
        );
    }

    #[test]
    fn test_single_replica_skips_prepare() {
        let events = cycle(&Script::honest(1), 5);
        let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                EventType::ClientRequest,
                EventType::PrePrepare,
                EventType::Commit,
                EventType::Reply,
                EventType::ClientRequest,
            ]
        );
    }

    #[test]
    fn test_all_faulty_still_progresses() {
        let faulty = (0..4).map(ReplicaId).collect();
        let events = cycle(&Script::new(4, faulty), 4);
        assert_eq!(events[2], ScriptedEvent::ClientRequest { seq: SeqNum(2) });
        assert_eq!(events[3].event_type(), EventType::PrePrepare);
    }

    #[test]
    fn test_stale_cursor_is_settled() {
        // Cursor parked in PREPARE at replica 2, then 2 and 3 become faulty.
        let cursor = ScriptCursor {
            stage: ScriptStage::Prepare,
            replica: 2,
            seq: SeqNum(5),
        };
        let script = Script::new(4, BTreeSet::from([ReplicaId(2), ReplicaId(3)]));
        let (_, event) = advance(cursor, &script);
        assert_eq!(
            event,
            ScriptedEvent::Commit {
                seq: SeqNum(5),
                from: ReplicaId(0)
            }
        );
    }

    #[test]
    fn test_envelope_shape() {
        let reply = ScriptedEvent::Reply {
            seq: SeqNum(3),
            from: ReplicaId(1),
        };
        let env = reply.to_envelope(EventId(9), Duration::from_millis(2), LOCAL_SID);
        assert_eq!(env.event_type, EventType::Reply);
        assert_eq!(env.eid, EventId(9));
        assert_eq!(env.seq, SeqNum(3));
        assert_eq!(env.from, 1);
        assert_eq!(env.to, vec![Participant::CLIENT_WIRE]);
        assert_eq!(env.ts, 2_000);
        assert_eq!(env.sid, "local");

        let request = ScriptedEvent::ClientRequest { seq: SeqNum(1) };
        let env = request.to_envelope(EventId(1), Duration::ZERO, LOCAL_SID);
        assert_eq!(env.from, Participant::CLIENT_WIRE);
        assert_eq!(env.to, vec![0]);
    }
}
