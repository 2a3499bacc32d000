//! Timer management for the runner.
//!
//! Each timer is a tokio task that sleeps and then reports back on a channel.
//! A fire carries the token it was armed with; re-arming or cancelling a timer
//! invalidates its token, so a fire already sitting in the channel is ignored.

use pbftviz_core::TimerId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A timer expiry as delivered to the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub id: TimerId,
    pub token: u64,
}

/// Manages the scheduler's timers.
pub struct TimerManager {
    /// Active timers (id -> token, task handle).
    timers: HashMap<TimerId, (u64, JoinHandle<()>)>,
    next_token: u64,
    fired_tx: mpsc::Sender<TimerFired>,
}

impl TimerManager {
    pub fn new(fired_tx: mpsc::Sender<TimerFired>) -> Self {
        Self {
            timers: HashMap::new(),
            next_token: 0,
            fired_tx,
        }
    }

    /// Arm `id` to fire after `duration`, replacing any pending timer with the
    /// same id.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(id);

        self.next_token += 1;
        let token = self.next_token;
        let fired_tx = self.fired_tx.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(timer = ?id, token, "Timer fired");
            // The runner may already be gone during shutdown.
            let _ = fired_tx.send(TimerFired { id, token }).await;
        });

        self.timers.insert(id, (token, handle));
        trace!(timer = ?id, ?duration, token, "Timer set");
    }

    /// Cancel a timer. No-op if it is not armed.
    pub fn cancel_timer(&mut self, id: TimerId) {
        if let Some((_, handle)) = self.timers.remove(&id) {
            handle.abort();
            trace!(timer = ?id, "Timer cancelled");
        }
    }

    /// Cancel every timer. Called during shutdown.
    pub fn cancel_all(&mut self) {
        for (id, (_, handle)) in self.timers.drain() {
            handle.abort();
            debug!(timer = ?id, "Timer cancelled (shutdown)");
        }
    }

    /// Accept a fire if it belongs to the currently armed timer.
    ///
    /// An accepted timer is no longer active; the scheduler re-arms it if it
    /// wants another tick.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.timers.get(&fired.id) {
            Some((token, _)) if *token == fired.token => {
                self.timers.remove(&fired.id);
                true
            }
            _ => {
                trace!(timer = ?fired.id, token = fired.token, "Discarding stale timer fire");
                false
            }
        }
    }

    /// Number of armed timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
