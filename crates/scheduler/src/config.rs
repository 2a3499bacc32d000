//! Configuration types for the scheduler.

use std::time::Duration;

/// Tick period for `rate` events per `unit_window`.
///
/// `max(1ms, floor(unit_window / max(1, rate)))`: a rate of zero behaves like
/// one event per window and the period never drops below one millisecond.
pub fn tick_period(unit_window: Duration, rate: u32) -> Duration {
    let window_ms = unit_window.as_millis() as u64;
    let ms = window_ms / u64::from(rate.max(1));
    Duration::from_millis(ms.max(1))
}

/// How long a pulse stays on screen for a given tick period (80%).
pub fn flight_duration(period: Duration) -> Duration {
    period * 4 / 5
}

/// Configuration for the scheduler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Scripted events generated per unit window.
    pub scripted_rate: u32,

    /// Live envelopes released per unit window.
    pub live_rate: u32,

    /// Window the rates are expressed against.
    pub unit_window: Duration,

    /// Maximum number of history snapshots kept for step-back.
    pub history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scripted_rate: 3,
            live_rate: 3,
            unit_window: Duration::from_secs(1),
            history_limit: 256,
        }
    }
}

impl SchedulerConfig {
    /// Set the scripted generation rate (clamped to at least 1).
    pub fn with_scripted_rate(mut self, rate: u32) -> Self {
        self.scripted_rate = rate.max(1);
        self
    }

    /// Set the live release rate (clamped to at least 1).
    pub fn with_live_rate(mut self, rate: u32) -> Self {
        self.live_rate = rate.max(1);
        self
    }

    /// Set the unit window.
    pub fn with_unit_window(mut self, window: Duration) -> Self {
        self.unit_window = window;
        self
    }

    /// Set the history limit (at least one snapshot).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Period between scripted ticks.
    pub fn scripted_period(&self) -> Duration {
        tick_period(self.unit_window, self.scripted_rate)
    }

    /// Period between live dequeues.
    pub fn live_period(&self) -> Duration {
        tick_period(self.unit_window, self.live_rate)
    }
}
