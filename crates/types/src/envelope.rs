//! Wire format for protocol events.
//!
//! # Wire Format
//!
//! One JSON object per protocol event:
//!
//! ```text
//! { "schema_ver": 1, "type": "Prepare", "ts": 1520, "sid": "run-1700000000000",
//!   "eid": 12, "view": 0, "seq": 3, "from": 2, "to": [], "data": {} }
//! ```
//!
//! `from`/`to` use `-1` for the client. Only `type` and `eid` are mandatory when
//! decoding; everything else falls back to a neutral default so that partially
//! populated records from third-party producers are still admitted.

use crate::{EventId, Participant, ReplicaId, SeqNum, View};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema version emitted by this workspace.
pub const SCHEMA_VERSION: u32 = 1;

/// Protocol event type carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    SessionStart,
    PrimaryElected,
    ClientRequest,
    PrePrepare,
    Prepare,
    Commit,
    Reply,
}

impl EventType {
    /// Get the wire name of this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionStart => "SessionStart",
            EventType::PrimaryElected => "PrimaryElected",
            EventType::ClientRequest => "ClientRequest",
            EventType::PrePrepare => "PrePrepare",
            EventType::Prepare => "Prepare",
            EventType::Commit => "Commit",
            EventType::Reply => "Reply",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single protocol event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default = "default_schema_ver")]
    pub schema_ver: u32,

    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Microseconds since the session started at the source.
    #[serde(default)]
    pub ts: u64,

    /// Session identifier assigned by the source.
    #[serde(default)]
    pub sid: String,

    pub eid: EventId,

    #[serde(default)]
    pub view: View,

    #[serde(default)]
    pub seq: SeqNum,

    #[serde(default = "default_from")]
    pub from: i64,

    #[serde(default)]
    pub to: Vec<i64>,

    #[serde(default)]
    pub data: serde_json::Value,
}

fn default_schema_ver() -> u32 {
    SCHEMA_VERSION
}

fn default_from() -> i64 {
    Participant::CLIENT_WIRE
}

impl Envelope {
    /// Create an envelope with empty `data` and the current schema version.
    pub fn new(
        event_type: EventType,
        eid: EventId,
        seq: SeqNum,
        from: Participant,
        to: &[Participant],
    ) -> Self {
        Self {
            schema_ver: SCHEMA_VERSION,
            event_type,
            ts: 0,
            sid: String::new(),
            eid,
            view: View::ZERO,
            seq,
            from: from.to_wire(),
            to: to.iter().map(|p| p.to_wire()).collect(),
            data: serde_json::Value::Object(Default::default()),
        }
    }

    /// Set the source timestamp (µs).
    pub fn with_ts(mut self, ts: u64) -> Self {
        self.ts = ts;
        self
    }

    /// Set the session identifier.
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = sid.into();
        self
    }

    /// Set the free-form payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Sender decoded from the wire value.
    pub fn sender(&self) -> Participant {
        Participant::from_wire(self.from)
    }

    /// Sending replica, if the sender is not the client.
    pub fn sender_replica(&self) -> Option<ReplicaId> {
        self.sender().replica()
    }

    /// Recipients decoded from the wire values.
    pub fn recipients(&self) -> Vec<Participant> {
        self.to.iter().map(|&v| Participant::from_wire(v)).collect()
    }

    /// Read an integer field from `data`, if present.
    pub fn data_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(serde_json::Value::as_i64)
    }

    /// Encode as a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from a JSON document.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
