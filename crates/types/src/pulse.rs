//! Message pulses: one visual edge of the communication graph.

use crate::Participant;
use std::time::Duration;

/// Kind of message a pulse represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PulseKind {
    Client,
    PrePrepare,
    Prepare,
    Commit,
    Reply,
}

impl PulseKind {
    /// Get a human-readable name for this pulse kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            PulseKind::Client => "Client",
            PulseKind::PrePrepare => "PrePrepare",
            PulseKind::Prepare => "Prepare",
            PulseKind::Commit => "Commit",
            PulseKind::Reply => "Reply",
        }
    }
}

/// A single message in flight at a point in simulated time.
///
/// Pulses are ephemeral: a renderer draws them while `age < flight` and
/// ignores them afterwards. An empty `to` means "all replicas".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pulse {
    pub kind: PulseKind,
    pub from: Participant,
    pub to: Vec<Participant>,
    /// Time the message was emitted.
    pub at: Duration,
}

impl Pulse {
    /// Create a new pulse.
    pub fn new(kind: PulseKind, from: Participant, to: Vec<Participant>, at: Duration) -> Self {
        Self { kind, from, to, at }
    }

    /// Time elapsed since the pulse was emitted (zero if `now` is earlier).
    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.at)
    }

    /// Whether the pulse has finished its flight.
    pub fn is_stale(&self, now: Duration, flight: Duration) -> bool {
        self.age(now) > flight
    }

    /// Flight progress in `[0, 1]`.
    pub fn progress(&self, now: Duration, flight: Duration) -> f64 {
        if flight.is_zero() {
            return 1.0;
        }
        (self.age(now).as_secs_f64() / flight.as_secs_f64()).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReplicaId;

    fn pulse_at(ms: u64) -> Pulse {
        Pulse::new(
            PulseKind::Prepare,
            Participant::Replica(ReplicaId(1)),
            vec![],
            Duration::from_millis(ms),
        )
    }

    #[test]
    fn test_staleness() {
        let pulse = pulse_at(100);
        let flight = Duration::from_millis(200);

        assert!(!pulse.is_stale(Duration::from_millis(250), flight));
        assert!(!pulse.is_stale(Duration::from_millis(300), flight));
        assert!(pulse.is_stale(Duration::from_millis(301), flight));
        // A clock behind the pulse is age zero, never negative.
        assert_eq!(pulse.age(Duration::from_millis(50)), Duration::ZERO);
    }

    #[test]
    fn test_progress_is_clamped() {
        let pulse = pulse_at(0);
        let flight = Duration::from_millis(100);

        assert_eq!(pulse.progress(Duration::from_millis(50), flight), 0.5);
        assert_eq!(pulse.progress(Duration::from_millis(500), flight), 1.0);
        assert_eq!(pulse.progress(Duration::from_millis(10), Duration::ZERO), 1.0);
    }
}
