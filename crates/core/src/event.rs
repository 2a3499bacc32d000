//! Event types for the engine state machine.

use crate::Intent;
use pbftviz_types::{ConnectionStatus, Envelope};

/// Timers the engine can arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Scripted mode: advance the generator by one stage.
    ScriptTick,
    /// Live mode: dispatch one queued envelope.
    LiveTick,
}

/// All inputs the engine can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns effects.
#[derive(Debug, Clone)]
pub enum Event {
    /// The user asked for something.
    Intent(Intent),

    /// A previously armed timer fired.
    Timer(TimerId),

    /// The connector delivered a parsed envelope.
    EnvelopeReceived(Envelope),

    /// The connector's status changed.
    ConnectionChanged(ConnectionStatus),
}

impl Event {
    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::Intent(intent) => intent.type_name(),
            Event::Timer(TimerId::ScriptTick) => "ScriptTick",
            Event::Timer(TimerId::LiveTick) => "LiveTick",
            Event::EnvelopeReceived(_) => "EnvelopeReceived",
            Event::ConnectionChanged(_) => "ConnectionChanged",
        }
    }
}

impl From<Intent> for Event {
    fn from(intent: Intent) -> Self {
        Event::Intent(intent)
    }
}
