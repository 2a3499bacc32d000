//! Protocol state reducer.
//!
//! This crate turns a stream of protocol actions into a consistent view of
//! per-replica phase and quorum progress. It is a *display* reducer:
//!
//! - **Total**: every action is accepted in every state
//! - **Deterministic**: same state + action = same next state
//! - **Side-effect free**: no I/O, no clocks; time arrives inside the action
//!
//! It does not check protocol safety. A `Commit` from a replica that never sent
//! `Prepare` is admitted, and phase colouring does not wait for `2f+1` distinct
//! senders. Do not reuse it as a consensus engine.
//!
//! State is built from `im` persistent collections, so every transition
//! produces a new value that shares structure with the previous one. Older
//! states held by the history buffer are never affected by later transitions.

mod action;
mod state;
mod translate;

pub use action::Action;
pub use state::{reduce, ProtocolState, Stage, StageMarker, LOG_LIMIT, PULSE_WINDOW};
