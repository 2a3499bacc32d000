//! User intents.

use pbftviz_types::ReplicaId;
use std::collections::BTreeSet;

/// Requests coming from the user-facing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Start a new session with `n` replicas tolerating `f` faults (clamped).
    ApplyConfig { n: u32, f: u32 },

    /// Replace the set of silent replicas used by scripted mode.
    SetFaultySet { replicas: BTreeSet<ReplicaId> },

    /// Change the scripted generation rate (events per second).
    SetRate { events_per_sec: u32 },

    /// Start scripted mode from a fresh session.
    Start,

    /// Stop scripted mode.
    Stop,

    /// Suspend ticking (scripted generation or live dequeue).
    Pause,

    /// Resume ticking.
    Resume,

    /// Advance exactly one stage (scripted) or one envelope (live).
    Step,

    /// Undo the most recent step.
    StepBack,

    /// Switch to live mode and open the stream.
    Connect,

    /// Close the stream and drop queued envelopes.
    Disconnect,
}

impl Intent {
    /// Get a human-readable name for this intent.
    pub fn type_name(&self) -> &'static str {
        match self {
            Intent::ApplyConfig { .. } => "ApplyConfig",
            Intent::SetFaultySet { .. } => "SetFaultySet",
            Intent::SetRate { .. } => "SetRate",
            Intent::Start => "Start",
            Intent::Stop => "Stop",
            Intent::Pause => "Pause",
            Intent::Resume => "Resume",
            Intent::Step => "Step",
            Intent::StepBack => "StepBack",
            Intent::Connect => "Connect",
            Intent::Disconnect => "Disconnect",
        }
    }
}
