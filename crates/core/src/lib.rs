//! Core seams between the engine components.
//!
//! The engine is a synchronous state machine driven by a runner:
//!
//! ```text
//!   user intents ─┐
//!   timer fires ──┼──► Event ──► StateMachine::handle ──► Vec<Effect> ──► runner
//!   envelopes ────┤                                          (timers, connect,
//!   conn status ──┘                                           disconnect)
//! ```
//!
//! The state machine never performs I/O and never reads a clock; the runner
//! calls [`StateMachine::set_time`] before every [`StateMachine::handle`].

mod effect;
mod event;
mod intent;
mod traits;

pub use effect::Effect;
pub use event::{Event, TimerId};
pub use intent::Intent;
pub use traits::StateMachine;
