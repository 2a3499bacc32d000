//! The state machine seam.

use crate::{Effect, Event};
use std::time::Duration;

/// Engine component driven by a runner.
///
/// `handle` never awaits and never touches the network or a clock: timers,
/// stream connections and wall time all come in as [`Event`]s or through
/// [`set_time`](StateMachine::set_time), and every outside request goes out as
/// an [`Effect`]. Feeding the same events at the same times always yields the
/// same effects, which is what lets the scheduler be tested without tokio.
///
/// ```ignore
/// scheduler.set_time(started.elapsed());
/// for effect in scheduler.handle(Event::Intent(Intent::Step)) {
///     runner.execute(effect);
/// }
/// ```
pub trait StateMachine {
    /// Consume one event and return the effects the runner must carry out,
    /// in order.
    fn handle(&mut self, event: Event) -> Vec<Effect>;

    /// Runner clock, elapsed since the runner started. Stamped onto pulses.
    fn set_time(&mut self, now: Duration);

    /// Time last passed to [`set_time`](StateMachine::set_time).
    fn now(&self) -> Duration;
}
