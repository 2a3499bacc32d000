//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Replica identifier (index into the cluster, `0..n`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReplicaId(pub u32);

impl ReplicaId {
    /// The primary. Replica 0 proposes every request in the happy path.
    pub const PRIMARY: Self = ReplicaId(0);

    /// Whether this replica is the primary.
    pub fn is_primary(self) -> bool {
        self == Self::PRIMARY
    }

    /// Get the raw index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Envelope identifier, monotonically assigned by the event source.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl EventId {
    /// Get the next event id. Saturates at `u64::MAX`.
    pub fn next(self) -> Self {
        EventId(self.0.saturating_add(1))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence number of one agreement instance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SeqNum(pub u64);

impl SeqNum {
    /// Sequence number before any request has been proposed.
    pub const ZERO: Self = SeqNum(0);

    /// Get the next sequence number. Saturates at `u64::MAX`.
    pub fn next(self) -> Self {
        SeqNum(self.0.saturating_add(1))
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol view (epoch). Always zero: view changes are not modelled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct View(pub u64);

impl View {
    /// The only view the happy path ever uses.
    pub const ZERO: Self = View(0);
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One endpoint of a message edge: the client or a replica.
///
/// On the wire the client is encoded as `-1` and replicas as their index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Participant {
    /// The external client issuing requests and receiving replies.
    Client,
    /// A replica in the cluster.
    Replica(ReplicaId),
}

impl Participant {
    /// Wire value used for the client.
    pub const CLIENT_WIRE: i64 = -1;

    /// Decode a wire endpoint. Negative values denote the client.
    ///
    /// Values beyond `u32::MAX` cannot name a replica and are treated as the client too.
    pub fn from_wire(value: i64) -> Self {
        match u32::try_from(value) {
            Ok(index) => Participant::Replica(ReplicaId(index)),
            Err(_) => Participant::Client,
        }
    }

    /// Encode as a wire endpoint.
    pub fn to_wire(self) -> i64 {
        match self {
            Participant::Client => Self::CLIENT_WIRE,
            Participant::Replica(id) => i64::from(id.0),
        }
    }

    /// The replica, if this endpoint is one.
    pub fn replica(self) -> Option<ReplicaId> {
        match self {
            Participant::Client => None,
            Participant::Replica(id) => Some(id),
        }
    }
}

impl From<ReplicaId> for Participant {
    fn from(id: ReplicaId) -> Self {
        Participant::Replica(id)
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Participant::Client => write!(f, "client"),
            Participant::Replica(id) => write!(f, "{}", id),
        }
    }
}
