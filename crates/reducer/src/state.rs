//! Protocol view and the reduce function.

use crate::Action;
use im::{OrdMap, OrdSet, Vector};
use pbftviz_types::{
    EventId, Participant, Phase, Pulse, PulseKind, ReplicaId, SeqNum, SessionConfig, View,
};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Number of human-readable log lines kept.
pub const LOG_LIMIT: usize = 8;

/// Number of most recent pulses kept. Consumers filter these by age.
pub const PULSE_WINDOW: usize = 8;

/// What is happening right now, independent of which replica triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stage {
    #[default]
    Idle,
    SessionStart,
    ClientRequest,
    PrePrepare,
    Prepare,
    Commit,
    Reply,
}

impl Stage {
    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::SessionStart => "Session Start",
            Stage::ClientRequest => "Client Request",
            Stage::PrePrepare => "PrePrepare",
            Stage::Prepare => "Prepare",
            Stage::Commit => "Commit",
            Stage::Reply => "Reply",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stage indicator with the sequence number it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StageMarker {
    pub stage: Stage,
    pub seq: Option<SeqNum>,
}

impl StageMarker {
    fn new(stage: Stage, seq: SeqNum) -> Self {
        Self {
            stage,
            seq: Some(seq),
        }
    }

    /// Display label of the stage.
    pub fn label(&self) -> &'static str {
        self.stage.label()
    }
}

/// The consistent protocol view consumed by rendering.
///
/// Cloning is O(1); collections are shared structurally between versions.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolState {
    session: SessionConfig,
    view: View,
    seq: SeqNum,
    prepares: OrdSet<ReplicaId>,
    commits: OrdSet<ReplicaId>,
    node_phase: OrdMap<ReplicaId, Phase>,
    pulses: Vector<Pulse>,
    last_eid: Option<EventId>,
    connected: bool,
    stage: StageMarker,
    event_log: Vector<String>,
}

impl Default for ProtocolState {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            view: View::ZERO,
            seq: SeqNum::ZERO,
            prepares: OrdSet::new(),
            commits: OrdSet::new(),
            node_phase: OrdMap::new(),
            pulses: Vector::new(),
            last_eid: None,
            connected: false,
            stage: StageMarker::default(),
            event_log: Vector::new(),
        }
    }
}

/// Apply `action` to `state`, producing the next state.
///
/// `state` itself is left untouched.
pub fn reduce(state: &ProtocolState, action: Action) -> ProtocolState {
    state.reduce(action)
}

impl ProtocolState {
    /// Create the initial (pre-session) state.
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Transitions
    // ═══════════════════════════════════════════════════════════════════════

    /// Apply `action`, producing the next state.
    pub fn reduce(&self, action: Action) -> ProtocolState {
        let mut next = self.clone();
        next.apply(action);
        next
    }

    fn apply(&mut self, action: Action) {
        debug!(action = action.type_name(), seq = self.seq.0, "Reducing action");

        match action {
            Action::SessionStart { config } => {
                self.session = config;
                self.view = View::ZERO;
                self.seq = SeqNum::ZERO;
                self.prepares = OrdSet::new();
                self.commits = OrdSet::new();
                self.node_phase = config.replicas().map(|id| (id, Phase::Idle)).collect();
                self.stage = StageMarker::new(Stage::SessionStart, SeqNum::ZERO);
                self.log(format!(
                    "Session start · n={}, f={}",
                    config.n(),
                    config.f()
                ));
            }

            Action::PrimaryElected => {
                self.log("Primary elected".to_string());
            }

            Action::ClientRequest { to, at, eid } => {
                self.pulse(Pulse::new(
                    PulseKind::Client,
                    Participant::Client,
                    vec![to.into()],
                    at,
                ));
                // Optimistic: the request will become the next instance.
                self.stage = StageMarker::new(Stage::ClientRequest, self.seq.next());
                self.last_eid = Some(eid);
                self.log(format!("ClientRequest · to primary ({})", to));
            }

            Action::PrePrepare {
                seq,
                from,
                to,
                at,
                eid,
            } => {
                // A new instance voids any partial acknowledgements of the last one.
                self.prepares = OrdSet::new();
                self.commits = OrdSet::new();
                self.seq = seq;
                self.node_phase.insert(from, Phase::PrePrepare);
                let targets = if to.is_empty() {
                    "-".to_string()
                } else {
                    join_ids(&to)
                };
                self.pulse(Pulse::new(
                    PulseKind::PrePrepare,
                    from.into(),
                    to.into_iter().map(Participant::from).collect(),
                    at,
                ));
                self.stage = StageMarker::new(Stage::PrePrepare, seq);
                self.last_eid = Some(eid);
                self.log(format!(
                    "PrePrepare · from {} → [{}] · seq={}",
                    from, targets, seq
                ));
            }

            Action::Prepare { from, to, at, eid } => {
                self.prepares.insert(from);
                self.node_phase.insert(from, Phase::Prepare);
                let line = format!("Prepare · from {} → {}", from, describe_targets(&to));
                self.pulse(Pulse::new(
                    PulseKind::Prepare,
                    from.into(),
                    to.into_iter().map(Participant::from).collect(),
                    at,
                ));
                self.stage = StageMarker::new(Stage::Prepare, self.seq);
                self.last_eid = Some(eid);
                self.log(line);
            }

            Action::Commit { from, to, at, eid } => {
                self.commits.insert(from);
                self.node_phase.insert(from, Phase::Commit);
                let line = format!("Commit · from {} → {}", from, describe_targets(&to));
                self.pulse(Pulse::new(
                    PulseKind::Commit,
                    from.into(),
                    to.into_iter().map(Participant::from).collect(),
                    at,
                ));
                self.stage = StageMarker::new(Stage::Commit, self.seq);
                self.last_eid = Some(eid);
                self.log(line);
            }

            Action::Reply { from, at, eid } => {
                self.node_phase.insert(from, Phase::Reply);
                self.pulse(Pulse::new(
                    PulseKind::Reply,
                    from.into(),
                    vec![Participant::Client],
                    at,
                ));
                self.stage = StageMarker::new(Stage::Reply, self.seq);
                self.last_eid = Some(eid);
                self.log(format!("Reply · from {} → client", from));
            }

            Action::ConnectionStatus { connected } => {
                self.connected = connected;
                self.log(if connected {
                    "Connected to stream".to_string()
                } else {
                    "Disconnected from stream".to_string()
                });
            }

            Action::Restore { snapshot } => {
                *self = *snapshot;
            }
        }
    }

    fn log(&mut self, line: String) {
        self.event_log.push_back(line);
        while self.event_log.len() > LOG_LIMIT {
            self.event_log.pop_front();
        }
    }

    fn pulse(&mut self, pulse: Pulse) {
        self.pulses.push_back(pulse);
        while self.pulses.len() > PULSE_WINDOW {
            self.pulses.pop_front();
        }
    }

    /// Copy of this state with every pulse re-stamped at `now`.
    ///
    /// Used when restoring history so that replayed pulses animate from the
    /// current instant instead of appearing already decayed.
    pub fn retimed(&self, now: Duration) -> ProtocolState {
        let mut next = self.clone();
        next.pulses = self
            .pulses
            .iter()
            .map(|p| Pulse { at: now, ..p.clone() })
            .collect();
        next
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Rendering accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Session parameters.
    pub fn session(&self) -> SessionConfig {
        self.session
    }

    /// Replica count.
    pub fn n(&self) -> u32 {
        self.session.n()
    }

    /// Tolerated faulty replicas.
    pub fn f(&self) -> u32 {
        self.session.f()
    }

    /// Current view (always zero).
    pub fn view(&self) -> View {
        self.view
    }

    /// Current agreement instance.
    pub fn seq(&self) -> SeqNum {
        self.seq
    }

    /// Phase of every known replica.
    pub fn node_phase(&self) -> &OrdMap<ReplicaId, Phase> {
        &self.node_phase
    }

    /// Phase of one replica, `Idle` if unknown.
    pub fn phase(&self, replica: ReplicaId) -> Phase {
        self.node_phase.get(&replica).copied().unwrap_or_default()
    }

    /// Replicas that sent PREPARE for the current instance.
    pub fn prepares(&self) -> &OrdSet<ReplicaId> {
        &self.prepares
    }

    /// Replicas that sent COMMIT for the current instance.
    pub fn commits(&self) -> &OrdSet<ReplicaId> {
        &self.commits
    }

    /// Quorum threshold (2f+1).
    pub fn quorum_threshold(&self) -> u32 {
        self.session.quorum_threshold()
    }

    /// Commit progress towards quorum, in `[0, 1]`.
    pub fn quorum_progress(&self) -> f64 {
        self.session.quorum_progress(self.commits.len())
    }

    /// Most recent pulses, oldest first.
    pub fn pulses(&self) -> &Vector<Pulse> {
        &self.pulses
    }

    /// Pulses still in flight at `now`.
    pub fn active_pulses(&self, now: Duration, flight: Duration) -> impl Iterator<Item = &Pulse> {
        self.pulses.iter().filter(move |p| !p.is_stale(now, flight))
    }

    /// Last admitted envelope id.
    pub fn last_eid(&self) -> Option<EventId> {
        self.last_eid
    }

    /// Whether the live stream is connected.
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Current stage marker.
    pub fn stage(&self) -> StageMarker {
        self.stage
    }

    /// Trailing human-readable log, oldest first.
    pub fn event_log(&self) -> &Vector<String> {
        &self.event_log
    }
}

fn join_ids(ids: &[ReplicaId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn describe_targets(to: &[ReplicaId]) -> String {
    if to.is_empty() {
        "all replicas".to_string()
    } else {
        format!("[{}]", join_ids(to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn at(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn started(n: u32, f: u32) -> ProtocolState {
        ProtocolState::new().reduce(Action::SessionStart {
            config: SessionConfig::new(n, f),
        })
    }

    fn pre_prepare(seq: u64, eid: u64, n: u32) -> Action {
        Action::PrePrepare {
            seq: SeqNum(seq),
            from: ReplicaId::PRIMARY,
            to: (1..n).map(ReplicaId).collect(),
            at: at(eid * 10),
            eid: EventId(eid),
        }
    }

    fn prepare(from: u32, eid: u64) -> Action {
        Action::Prepare {
            from: ReplicaId(from),
            to: vec![],
            at: at(eid * 10),
            eid: EventId(eid),
        }
    }

    fn commit(from: u32, eid: u64) -> Action {
        Action::Commit {
            from: ReplicaId(from),
            to: vec![],
            at: at(eid * 10),
            eid: EventId(eid),
        }
    }

    #[test]
    fn test_initial_state() {
        let state = ProtocolState::new();
        assert_eq!(state.n(), 4);
        assert_eq!(state.f(), 1);
        assert_eq!(state.stage().label(), "Idle");
        assert_eq!(state.stage().seq, None);
        assert!(state.node_phase().is_empty());
        assert_eq!(state.last_eid(), None);
    }

    #[traced_test]
    #[test]
    fn test_session_start_resets_every_replica_to_idle() {
        for n in 1..=25 {
            let state = started(n, SessionConfig::max_faulty(n));
            assert_eq!(state.node_phase().len(), n as usize);
            assert!(state.node_phase().values().all(|p| *p == Phase::Idle));
            assert_eq!(state.commits().len(), 0);
            assert_eq!(state.prepares().len(), 0);
            assert_eq!(state.seq(), SeqNum::ZERO);
            assert_eq!(state.stage().label(), "Session Start");
        }
    }

    #[test]
    fn test_session_start_after_progress_clears_everything() {
        let state = started(4, 1)
            .reduce(pre_prepare(1, 1, 4))
            .reduce(prepare(1, 2))
            .reduce(commit(2, 3))
            .reduce(Action::SessionStart {
                config: SessionConfig::new(7, 2),
            });

        assert_eq!(state.n(), 7);
        assert_eq!(state.node_phase().len(), 7);
        assert!(state.prepares().is_empty());
        assert!(state.commits().is_empty());
        assert_eq!(state.phase(ReplicaId(2)), Phase::Idle);
        assert_eq!(
            state.event_log().back().map(String::as_str),
            Some("Session start · n=7, f=2")
        );
    }

    #[test]
    fn test_pre_prepare_starts_fresh_instance() {
        let state = started(4, 1)
            .reduce(pre_prepare(1, 1, 4))
            .reduce(prepare(1, 2))
            .reduce(prepare(2, 3))
            .reduce(commit(1, 4));
        assert_eq!(state.prepares().len(), 2);
        assert_eq!(state.commits().len(), 1);

        let state = state.reduce(pre_prepare(2, 5, 4));
        assert!(state.prepares().is_empty());
        assert!(state.commits().is_empty());
        assert_eq!(state.seq(), SeqNum(2));
        assert_eq!(state.phase(ReplicaId::PRIMARY), Phase::PrePrepare);
        assert_eq!(state.stage().seq, Some(SeqNum(2)));
        assert_eq!(
            state.event_log().back().map(String::as_str),
            Some("PrePrepare · from 0 → [1,2,3] · seq=2")
        );
    }

    #[test]
    fn test_ack_sets_and_phases() {
        let state = started(4, 1)
            .reduce(pre_prepare(1, 1, 4))
            .reduce(prepare(1, 2))
            .reduce(prepare(1, 3))
            .reduce(commit(3, 4));

        // Duplicate sends count once.
        assert_eq!(state.prepares().len(), 1);
        assert_eq!(state.phase(ReplicaId(1)), Phase::Prepare);
        assert_eq!(state.phase(ReplicaId(3)), Phase::Commit);
        assert_eq!(state.stage().label(), "Commit");
        assert_eq!(state.stage().seq, Some(SeqNum(1)));
        assert_eq!(state.last_eid(), Some(EventId(4)));
    }

    #[test]
    fn test_reply_keeps_ack_sets() {
        let state = started(4, 1)
            .reduce(pre_prepare(1, 1, 4))
            .reduce(commit(0, 2))
            .reduce(commit(1, 3));
        let replied = state.reduce(Action::Reply {
            from: ReplicaId(1),
            at: at(40),
            eid: EventId(4),
        });

        assert_eq!(replied.commits(), state.commits());
        assert_eq!(replied.phase(ReplicaId(1)), Phase::Reply);
        let pulse = replied.pulses().back().unwrap();
        assert_eq!(pulse.kind, PulseKind::Reply);
        assert_eq!(pulse.to, vec![Participant::Client]);
        assert_eq!(
            replied.event_log().back().map(String::as_str),
            Some("Reply · from 1 → client")
        );
    }

    #[test]
    fn test_client_request_bumps_stage_seq_only() {
        let state = started(4, 1);
        let state = state.reduce(Action::ClientRequest {
            to: ReplicaId::PRIMARY,
            at: at(5),
            eid: EventId(1),
        });

        assert_eq!(state.seq(), SeqNum::ZERO);
        assert_eq!(state.stage().label(), "Client Request");
        assert_eq!(state.stage().seq, Some(SeqNum(1)));
        let pulse = state.pulses().back().unwrap();
        assert_eq!(pulse.from, Participant::Client);
        assert_eq!(pulse.to, vec![Participant::Replica(ReplicaId::PRIMARY)]);
    }

    #[test]
    fn test_quorum_progress() {
        let mut state = started(4, 1).reduce(pre_prepare(1, 1, 4));
        assert_eq!(state.quorum_threshold(), 3);
        assert_eq!(state.quorum_progress(), 0.0);

        for (i, from) in [0, 1, 2, 3].into_iter().enumerate() {
            state = state.reduce(commit(from, 2 + i as u64));
        }
        // Four commits against a threshold of three saturate at one.
        assert_eq!(state.quorum_progress(), 1.0);
    }

    #[test]
    fn test_log_is_bounded() {
        let mut state = started(4, 1);
        for eid in 1..=20 {
            state = state.reduce(prepare((eid % 4) as u32, eid));
        }
        assert_eq!(state.event_log().len(), LOG_LIMIT);
        assert_eq!(
            state.event_log().back().map(String::as_str),
            Some("Prepare · from 0 → all replicas")
        );
        assert!(state.pulses().len() <= PULSE_WINDOW);
    }

    #[test]
    fn test_reduce_leaves_previous_state_untouched() {
        let before = started(4, 1).reduce(pre_prepare(1, 1, 4));
        let snapshot = before.clone();
        let after = reduce(&before, prepare(2, 2));

        assert_eq!(before, snapshot);
        assert_ne!(after, before);
        assert!(after.prepares().contains(&ReplicaId(2)));
        assert!(!before.prepares().contains(&ReplicaId(2)));
    }

    #[test]
    fn test_restore_replaces_state_wholesale() {
        let old = started(4, 1).reduce(pre_prepare(1, 1, 4));
        let current = old.reduce(prepare(1, 2)).reduce(commit(1, 3));
        let restored = current.reduce(Action::Restore {
            snapshot: Box::new(old.clone()),
        });
        assert_eq!(restored, old);
    }

    #[test]
    fn test_connection_status() {
        let state = ProtocolState::new().reduce(Action::ConnectionStatus { connected: true });
        assert!(state.connected());
        assert_eq!(
            state.event_log().back().map(String::as_str),
            Some("Connected to stream")
        );

        let state = state.reduce(Action::ConnectionStatus { connected: false });
        assert!(!state.connected());
        assert_eq!(
            state.event_log().back().map(String::as_str),
            Some("Disconnected from stream")
        );
    }

    #[test]
    fn test_commit_without_prepare_is_admitted() {
        // Display reducer: no cross-action validation.
        let state = started(4, 1).reduce(commit(2, 1));
        assert!(state.commits().contains(&ReplicaId(2)));
        assert!(state.prepares().is_empty());
    }

    #[test]
    fn test_retimed_restamps_every_pulse() {
        let state = started(4, 1)
            .reduce(pre_prepare(1, 1, 4))
            .reduce(prepare(1, 2));
        let now = at(10_000);
        let retimed = state.retimed(now);

        assert!(retimed.pulses().iter().all(|p| p.at == now));
        assert_eq!(retimed.pulses().len(), state.pulses().len());
        assert_eq!(retimed.event_log(), state.event_log());
        assert_eq!(retimed.active_pulses(now, at(100)).count(), 2);
        assert_eq!(state.active_pulses(now, at(100)).count(), 0);
    }
}
