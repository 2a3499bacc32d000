//! Happy-path envelope generator.

use pbftviz_scheduler::{advance, Script, ScriptCursor};
use pbftviz_types::{Envelope, EventId, EventType, Participant, SeqNum, SessionConfig};
use serde_json::json;
use std::time::Duration;

/// Produces the source's envelope sequence: a session preamble followed by
/// endless scripted rounds with every replica honest.
#[derive(Debug, Clone)]
pub struct Generator {
    session: SessionConfig,
    script: Script,
    cursor: ScriptCursor,
    next_eid: EventId,
    sid: String,
}

impl Generator {
    pub fn new(session: SessionConfig, sid: impl Into<String>) -> Self {
        Self {
            session,
            script: Script::honest(session.n()),
            cursor: ScriptCursor::default(),
            next_eid: EventId(1),
            sid: sid.into(),
        }
    }

    /// `SessionStart` and `PrimaryElected`, stamped at `ts`.
    pub fn preamble(&mut self, ts: Duration) -> Vec<Envelope> {
        let start = self
            .envelope(EventType::SessionStart, ts)
            .with_data(json!({ "n": self.session.n(), "f": self.session.f() }));
        let elected = self
            .envelope(EventType::PrimaryElected, ts)
            .with_data(json!({ "primary": 0 }));
        vec![start, elected]
    }

    /// Next scripted envelope, stamped at `ts`.
    pub fn next_envelope(&mut self, ts: Duration) -> Envelope {
        let (cursor, event) = advance(self.cursor, &self.script);
        self.cursor = cursor;
        let eid = self.take_eid();
        event.to_envelope(eid, ts, &self.sid)
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    fn envelope(&mut self, event_type: EventType, ts: Duration) -> Envelope {
        let eid = self.take_eid();
        Envelope::new(event_type, eid, SeqNum::ZERO, Participant::Client, &[])
            .with_ts(ts.as_micros() as u64)
            .with_sid(self.sid.clone())
    }

    fn take_eid(&mut self) -> EventId {
        let eid = self.next_eid;
        self.next_eid = eid.next();
        eid
    }
}
