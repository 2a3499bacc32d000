//! Core types for the PBFT flow visualizer.
//!
//! Everything in here is plain data shared by the reducer, the scheduler, the
//! stream connector and the event source:
//!
//! - **Identifiers**: [`ReplicaId`], [`EventId`], [`SeqNum`], [`View`], [`Participant`]
//! - **Wire format**: [`Envelope`] and [`EventType`], one JSON object per protocol event
//! - **Display model**: [`Phase`], [`Pulse`], [`PulseKind`]
//! - **Session parameters**: [`SessionConfig`] with `n`/`f` clamping and quorum math

mod envelope;
mod identifiers;
mod phase;
mod pulse;
mod session;
mod status;

pub use envelope::{Envelope, EventType, SCHEMA_VERSION};
pub use identifiers::{EventId, Participant, ReplicaId, SeqNum, View};
pub use phase::Phase;
pub use pulse::{Pulse, PulseKind};
pub use session::{SessionConfig, MAX_REPLICAS};
pub use status::ConnectionStatus;
