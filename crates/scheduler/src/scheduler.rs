//! The engine state machine.

use crate::history::{Cursor, HistoryBuffer, Snapshot};
use crate::live::LiveQueue;
use crate::script::{advance, Script, ScriptCursor, LOCAL_SID};
use crate::{flight_duration, SchedulerConfig};
use pbftviz_core::{Effect, Event, Intent, StateMachine, TimerId};
use pbftviz_reducer::{Action, ProtocolState};
use pbftviz_types::{ConnectionStatus, Envelope, EventId, EventType, ReplicaId, SessionConfig};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Which source drives the protocol view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Locally generated happy-path rounds.
    #[default]
    Scripted,
    /// Envelopes received from a remote stream.
    Live,
}

/// Snapshot of the scheduler's control state, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub mode: Mode,
    /// Scripted auto-advance is on.
    pub running: bool,
    pub paused: bool,
    pub connection: ConnectionStatus,
    pub queue_len: usize,
    pub history_len: usize,
    pub last_live_type: Option<EventType>,
}

/// Owns the protocol view and decides when it changes.
///
/// Every state change goes through [`ProtocolState::reduce`]. The scheduler
/// performs no I/O: timers and stream connections are requested through the
/// returned [`Effect`]s, and their outcomes come back as [`Event`]s.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    state: ProtocolState,
    mode: Mode,

    // Scripted mode
    running: bool,
    session_started: bool,
    cursor: ScriptCursor,
    next_eid: EventId,
    faulty: BTreeSet<ReplicaId>,

    // Live mode
    live: LiveQueue,
    connection: ConnectionStatus,
    last_live_type: Option<EventType>,

    paused: bool,
    history: HistoryBuffer,
    now: Duration,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let history = HistoryBuffer::new(config.history_limit);
        Self {
            config,
            state: ProtocolState::new(),
            mode: Mode::Scripted,
            running: false,
            session_started: false,
            cursor: ScriptCursor::default(),
            next_eid: EventId(1),
            faulty: BTreeSet::new(),
            live: LiveQueue::new(),
            connection: ConnectionStatus::Disconnected,
            last_live_type: None,
            paused: false,
            history,
            now: Duration::ZERO,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Current protocol view.
    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn faulty(&self) -> &BTreeSet<ReplicaId> {
        &self.faulty
    }

    pub fn cursor(&self) -> ScriptCursor {
        self.cursor
    }

    pub fn queue_len(&self) -> usize {
        self.live.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Tick period of the active mode.
    pub fn tick_period(&self) -> Duration {
        match self.mode {
            Mode::Scripted => self.config.scripted_period(),
            Mode::Live => self.config.live_period(),
        }
    }

    /// How long pulses of the active mode stay in flight.
    pub fn flight_duration(&self) -> Duration {
        flight_duration(self.tick_period())
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            mode: self.mode,
            running: self.running,
            paused: self.paused,
            connection: self.connection,
            queue_len: self.live.len(),
            history_len: self.history.len(),
            last_live_type: self.last_live_type,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Intents
    // ═══════════════════════════════════════════════════════════════════════

    fn on_intent(&mut self, intent: Intent) -> Vec<Effect> {
        debug!(intent = intent.type_name(), mode = ?self.mode, "Handling intent");

        match intent {
            Intent::ApplyConfig { n, f } => {
                let config = SessionConfig::new(n, f);
                if config.n() != n || config.f() != f {
                    info!(
                        requested_n = n,
                        requested_f = f,
                        n = config.n(),
                        f = config.f(),
                        "Clamped session config"
                    );
                }
                self.start_session(config);
                vec![]
            }

            Intent::SetFaultySet { replicas } => {
                debug!(faulty = ?replicas, "Faulty set updated");
                self.faulty = replicas;
                vec![]
            }

            Intent::SetRate { events_per_sec } => {
                self.config.scripted_rate = events_per_sec.max(1);
                if self.script_ticking() {
                    vec![self.arm(TimerId::ScriptTick)]
                } else {
                    vec![]
                }
            }

            Intent::Start => {
                let mut effects = self.leave_live();
                self.start_session(self.state.session());
                self.running = true;
                self.paused = false;
                info!(n = self.state.n(), f = self.state.f(), "Scripted mode started");
                effects.push(self.arm(TimerId::ScriptTick));
                effects
            }

            Intent::Stop => {
                if self.mode != Mode::Scripted {
                    return vec![];
                }
                self.running = false;
                self.paused = false;
                self.session_started = false;
                info!("Scripted mode stopped");
                vec![Effect::CancelTimer {
                    id: TimerId::ScriptTick,
                }]
            }

            Intent::Pause => {
                self.paused = true;
                vec![Effect::CancelTimer {
                    id: self.active_timer(),
                }]
            }

            Intent::Resume => {
                self.paused = false;
                if self.script_ticking() {
                    vec![self.arm(TimerId::ScriptTick)]
                } else if self.mode == Mode::Live {
                    vec![self.arm(TimerId::LiveTick)]
                } else {
                    vec![]
                }
            }

            Intent::Step => {
                match self.mode {
                    Mode::Scripted => {
                        if !self.session_started {
                            self.start_session(self.state.session());
                        }
                        self.script_step();
                    }
                    Mode::Live => {
                        if !self.live_step() {
                            debug!("Live queue empty, nothing to step");
                        }
                    }
                }
                vec![]
            }

            Intent::StepBack => {
                self.step_back();
                vec![]
            }

            Intent::Connect => {
                let mut effects = Vec::new();
                let resume_from = match self.mode {
                    // Continue after what this view already shows.
                    Mode::Live => self.state.last_eid().map(EventId::next),
                    // Scripted eids are local; replay the source from its start.
                    Mode::Scripted => {
                        if self.running {
                            effects.push(Effect::CancelTimer {
                                id: TimerId::ScriptTick,
                            });
                        }
                        self.running = false;
                        self.session_started = false;
                        self.history.clear();
                        None
                    }
                };
                self.mode = Mode::Live;
                info!(resume_from = ?resume_from.map(|e| e.0), "Switching to live mode");
                effects.push(Effect::Connect { resume_from });
                if !self.paused {
                    effects.push(self.arm(TimerId::LiveTick));
                }
                effects
            }

            Intent::Disconnect => {
                if self.mode != Mode::Live {
                    return vec![];
                }
                let dropped = self.live.len();
                self.live.clear();
                // Snapshots would re-queue envelopes the next connection replays.
                self.history.clear();
                info!(dropped, "Disconnecting from stream");
                vec![
                    Effect::Disconnect,
                    Effect::CancelTimer {
                        id: TimerId::LiveTick,
                    },
                ]
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Timers and stream input
    // ═══════════════════════════════════════════════════════════════════════

    fn on_timer(&mut self, id: TimerId) -> Vec<Effect> {
        match id {
            TimerId::ScriptTick if self.script_ticking() => {
                self.script_step();
                vec![self.arm(TimerId::ScriptTick)]
            }
            TimerId::LiveTick if self.mode == Mode::Live && !self.paused => {
                self.live_step();
                vec![self.arm(TimerId::LiveTick)]
            }
            _ => {
                trace!(timer = ?id, "Ignoring timer outside its mode");
                vec![]
            }
        }
    }

    fn on_envelope(&mut self, envelope: Envelope) {
        if self.mode != Mode::Live {
            debug!(eid = envelope.eid.0, "Dropping envelope received outside live mode");
            return;
        }
        trace!(
            eid = envelope.eid.0,
            event_type = envelope.event_type.as_str(),
            queue_len = self.live.len() + 1,
            "Queued live envelope"
        );
        self.live.push(envelope);
    }

    fn on_connection(&mut self, status: ConnectionStatus) {
        self.connection = status;
        let connected = status.is_connected();
        if connected != self.state.connected() {
            info!(%status, "Stream connection changed");
            self.dispatch(Action::ConnectionStatus { connected });
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Stepping
    // ═══════════════════════════════════════════════════════════════════════

    fn start_session(&mut self, config: SessionConfig) {
        self.cursor = ScriptCursor::default();
        self.next_eid = EventId(1);
        self.history.clear();
        self.session_started = true;
        info!(n = config.n(), f = config.f(), "Starting session");
        self.dispatch(Action::SessionStart { config });
    }

    fn script_step(&mut self) {
        self.history.push(Snapshot {
            state: self.state.clone(),
            cursor: Cursor::Scripted {
                script: self.cursor,
                next_eid: self.next_eid,
            },
        });

        let script = Script::new(self.state.n(), self.faulty.clone());
        let (cursor, event) = advance(self.cursor, &script);
        self.cursor = cursor;

        let eid = self.next_eid;
        self.next_eid = eid.next();
        let envelope = event.to_envelope(eid, self.now, LOCAL_SID);
        self.admit(&envelope);
    }

    /// Release one queued envelope. Returns false when the queue is empty.
    fn live_step(&mut self) -> bool {
        let Some(envelope) = self.live.pop() else {
            return false;
        };
        self.history.push(Snapshot {
            state: self.state.clone(),
            cursor: Cursor::Live {
                replay: envelope.clone(),
            },
        });
        self.last_live_type = Some(envelope.event_type);
        self.admit(&envelope);
        true
    }

    fn step_back(&mut self) {
        let Some(snapshot) = self.history.pop(self.now) else {
            debug!("History empty, nothing to step back");
            return;
        };
        match snapshot.cursor {
            Cursor::Scripted { script, next_eid } => {
                self.cursor = script;
                self.next_eid = next_eid;
            }
            Cursor::Live { replay } => {
                self.live.push_front(replay);
            }
        }
        debug!(history_len = self.history.len(), "Stepped back");
        self.dispatch(Action::Restore {
            snapshot: Box::new(snapshot.state),
        });
        // The link did not go back in time with the view.
        self.on_connection(self.connection);
    }

    fn admit(&mut self, envelope: &Envelope) {
        match Action::from_envelope(envelope, self.now, self.state.session()) {
            Some(action) => self.dispatch(action),
            None => debug!(eid = envelope.eid.0, "Envelope produced no action"),
        }
    }

    fn dispatch(&mut self, action: Action) {
        self.state = self.state.reduce(action);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════

    fn script_ticking(&self) -> bool {
        self.mode == Mode::Scripted && self.running && !self.paused
    }

    fn active_timer(&self) -> TimerId {
        match self.mode {
            Mode::Scripted => TimerId::ScriptTick,
            Mode::Live => TimerId::LiveTick,
        }
    }

    fn arm(&self, id: TimerId) -> Effect {
        let duration = match id {
            TimerId::ScriptTick => self.config.scripted_period(),
            TimerId::LiveTick => self.config.live_period(),
        };
        Effect::SetTimer { id, duration }
    }

    /// Drop live-mode resources before switching to scripted mode.
    fn leave_live(&mut self) -> Vec<Effect> {
        if self.mode != Mode::Live {
            return vec![];
        }
        self.mode = Mode::Scripted;
        self.live.clear();
        info!("Leaving live mode");
        vec![
            Effect::Disconnect,
            Effect::CancelTimer {
                id: TimerId::LiveTick,
            },
        ]
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl StateMachine for Scheduler {
    fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Intent(intent) => self.on_intent(intent),
            Event::Timer(id) => self.on_timer(id),
            Event::EnvelopeReceived(envelope) => {
                self.on_envelope(envelope);
                vec![]
            }
            Event::ConnectionChanged(status) => {
                self.on_connection(status);
                vec![]
            }
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}
