//! Tokio driver for the scheduler.

use crate::recorder::Recorder;
use crate::timers::{TimerFired, TimerManager};
use pbftviz_connector::{Connector, ConnectorEvent, Transport};
use pbftviz_core::{Effect, Event, Intent, StateMachine};
use pbftviz_reducer::ProtocolState;
use pbftviz_scheduler::{Scheduler, SchedulerConfig, SchedulerStatus};
use pbftviz_types::{ConnectionStatus, Envelope};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, span, warn, Level};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Runner has shut down")]
    Closed,
}

/// Handle for shutting down a running [`Runner`].
///
/// When dropped, signals the runner to exit.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    /// Trigger shutdown (consumes the handle).
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Cloneable access to a running [`Runner`]: submit intents, watch the view.
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    intents: mpsc::Sender<Intent>,
    state: watch::Receiver<ProtocolState>,
    status: watch::Receiver<SchedulerStatus>,
}

impl RunnerHandle {
    pub async fn send(&self, intent: Intent) -> Result<(), RunnerError> {
        self.intents
            .send(intent)
            .await
            .map_err(|_| RunnerError::Closed)
    }

    /// Receiver of every published protocol view.
    pub fn state(&self) -> watch::Receiver<ProtocolState> {
        self.state.clone()
    }

    /// Receiver of scheduler status updates.
    pub fn status(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.clone()
    }
}

/// Owns the scheduler and executes its effects.
///
/// The scheduler only sees [`Event`]s: timer fires, received envelopes,
/// connection changes and user intents. Whatever it returns is carried out
/// here, and the resulting view is published on a watch channel.
pub struct Runner<T: Transport> {
    scheduler: Scheduler,
    connector: Connector<T>,
    timers: TimerManager,
    timer_rx: mpsc::Receiver<TimerFired>,
    intent_rx: mpsc::Receiver<Intent>,
    shutdown_rx: oneshot::Receiver<()>,
    state_tx: watch::Sender<ProtocolState>,
    status_tx: watch::Sender<SchedulerStatus>,
    recorder: Option<Recorder>,
    start_time: Instant,
}

impl<T: Transport> Runner<T> {
    pub fn new(
        config: SchedulerConfig,
        connector: Connector<T>,
        recorder: Option<Recorder>,
    ) -> (Self, RunnerHandle, ShutdownHandle) {
        let scheduler = Scheduler::new(config);
        let (timer_tx, timer_rx) = mpsc::channel(16);
        let (intent_tx, intent_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(scheduler.state().clone());
        let (status_tx, status_rx) = watch::channel(scheduler.status());

        let runner = Self {
            scheduler,
            connector,
            timers: TimerManager::new(timer_tx),
            timer_rx,
            intent_rx,
            shutdown_rx,
            state_tx,
            status_tx,
            recorder,
            start_time: Instant::now(),
        };
        let handle = RunnerHandle {
            intents: intent_tx,
            state: state_rx,
            status: status_rx,
        };
        let shutdown = ShutdownHandle {
            tx: Some(shutdown_tx),
        };
        (runner, handle, shutdown)
    }

    /// Run until shutdown is signalled or every [`RunnerHandle`] is dropped.
    pub async fn run(mut self) {
        info!("Runner started");

        loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => {
                    info!("Shutdown signal received");
                    break;
                }

                Some(fired) = self.timer_rx.recv() => {
                    if self.timers.accept(fired) {
                        self.handle(Event::Timer(fired.id));
                    }
                }

                event = self.connector.next_event() => match event {
                    Some(ConnectorEvent::Envelope(envelope)) => {
                        self.record(&envelope);
                        self.handle(Event::EnvelopeReceived(envelope));
                    }
                    Some(ConnectorEvent::Status(status)) => {
                        self.handle(Event::ConnectionChanged(status));
                    }
                    None => {
                        warn!("Stream task ended unexpectedly");
                        self.connector.disconnect();
                        self.handle(Event::ConnectionChanged(ConnectionStatus::Disconnected));
                    }
                },

                intent = self.intent_rx.recv() => match intent {
                    Some(intent) => self.handle(Event::Intent(intent)),
                    None => {
                        info!("All runner handles dropped");
                        break;
                    }
                },
            }
        }

        self.timers.cancel_all();
        self.connector.disconnect();
        if let Some(recorder) = &self.recorder {
            info!(path = %recorder.path().display(), written = recorder.written(), "Recording closed");
        }
        info!("Runner stopped");
    }

    /// Feed one event, execute its effects, then publish the new view.
    fn handle(&mut self, event: Event) {
        let mut pending = VecDeque::from([event]);

        while let Some(event) = pending.pop_front() {
            let event_span = span!(Level::DEBUG, "handle_event", event.type = event.type_name());
            let _guard = event_span.enter();

            self.scheduler.set_time(self.start_time.elapsed());
            for effect in self.scheduler.handle(event) {
                if let Some(follow_up) = self.execute(effect) {
                    pending.push_back(follow_up);
                }
            }
        }

        self.publish();
    }

    /// Carry out an effect. Returns an event to feed back when the effect has
    /// an immediate outcome the scheduler must learn about.
    fn execute(&mut self, effect: Effect) -> Option<Event> {
        debug!(effect = effect.type_name(), "Executing effect");

        match effect {
            Effect::SetTimer { id, duration } => {
                self.timers.set_timer(id, duration);
                None
            }
            Effect::CancelTimer { id } => {
                self.timers.cancel_timer(id);
                None
            }
            Effect::Connect { resume_from } => {
                if let Err(e) = self.connector.connect(resume_from) {
                    warn!(error = %e, "Cannot open stream");
                }
                Some(Event::ConnectionChanged(self.connector.status()))
            }
            Effect::Disconnect => {
                self.connector.disconnect();
                Some(Event::ConnectionChanged(ConnectionStatus::Disconnected))
            }
        }
    }

    fn record(&mut self, envelope: &Envelope) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        if let Err(e) = recorder.record(envelope) {
            warn!(error = %e, "Recording failed, disabling recorder");
            self.recorder = None;
        }
    }

    fn publish(&mut self) {
        let state = self.scheduler.state();
        self.state_tx.send_if_modified(|current| {
            if *current == *state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
        let status = self.scheduler.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}
