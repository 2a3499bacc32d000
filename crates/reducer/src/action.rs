//! Actions accepted by the reducer.

use crate::ProtocolState;
use pbftviz_types::{EventId, ReplicaId, SeqNum, SessionConfig};
use std::time::Duration;

/// Everything that can change the protocol view.
///
/// Actions that carry a protocol message also carry the envelope id they came
/// from (`eid`) and the time the message was observed (`at`).
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// A new session begins. `config` is already clamped.
    SessionStart { config: SessionConfig },

    /// The primary was announced. Informational only.
    PrimaryElected,

    /// The client sent a request to `to` (the primary).
    ClientRequest {
        to: ReplicaId,
        at: Duration,
        eid: EventId,
    },

    /// The primary proposed `seq`, starting a fresh agreement instance.
    PrePrepare {
        seq: SeqNum,
        from: ReplicaId,
        to: Vec<ReplicaId>,
        at: Duration,
        eid: EventId,
    },

    /// `from` sent PREPARE. An empty `to` means all replicas.
    Prepare {
        from: ReplicaId,
        to: Vec<ReplicaId>,
        at: Duration,
        eid: EventId,
    },

    /// `from` sent COMMIT. An empty `to` means all replicas.
    Commit {
        from: ReplicaId,
        to: Vec<ReplicaId>,
        at: Duration,
        eid: EventId,
    },

    /// `from` replied to the client.
    Reply {
        from: ReplicaId,
        at: Duration,
        eid: EventId,
    },

    /// The stream connection came up or went down.
    ConnectionStatus { connected: bool },

    /// Replace the whole state with a snapshot taken earlier.
    Restore { snapshot: Box<ProtocolState> },
}

impl Action {
    /// Get a human-readable name for this action.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::SessionStart { .. } => "SessionStart",
            Action::PrimaryElected => "PrimaryElected",
            Action::ClientRequest { .. } => "ClientRequest",
            Action::PrePrepare { .. } => "PrePrepare",
            Action::Prepare { .. } => "Prepare",
            Action::Commit { .. } => "Commit",
            Action::Reply { .. } => "Reply",
            Action::ConnectionStatus { .. } => "ConnectionStatus",
            Action::Restore { .. } => "Restore",
        }
    }

    /// Envelope id carried by this action, if it carries a protocol message.
    pub fn eid(&self) -> Option<EventId> {
        match self {
            Action::ClientRequest { eid, .. }
            | Action::PrePrepare { eid, .. }
            | Action::Prepare { eid, .. }
            | Action::Commit { eid, .. }
            | Action::Reply { eid, .. } => Some(*eid),
            _ => None,
        }
    }
}
