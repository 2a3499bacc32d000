//! Effect types for the engine state machine.

use crate::TimerId;
use pbftviz_types::EventId;
use std::time::Duration;

/// Things the state machine wants the runner to do.
///
/// Effects are **commands** - they describe something to do.
/// The runner executes them and may feed results back as events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Arm a timer. Replaces any pending timer with the same id.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a pending timer. A fire already in flight must be discarded.
    CancelTimer { id: TimerId },

    /// Open the live stream, asking the source to resume at `resume_from`.
    Connect { resume_from: Option<EventId> },

    /// Close the live stream and suppress reconnection.
    Disconnect,
}

impl Effect {
    /// Get a human-readable name for this effect.
    pub fn type_name(&self) -> &'static str {
        match self {
            Effect::SetTimer { .. } => "SetTimer",
            Effect::CancelTimer { .. } => "CancelTimer",
            Effect::Connect { .. } => "Connect",
            Effect::Disconnect => "Disconnect",
        }
    }
}
