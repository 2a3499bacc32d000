//! Scheduler for the PBFT flow visualizer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Scheduler                         │
//! │                                                          │
//! │  scripted:  ScriptCursor ──advance()──► Envelope ─┐      │
//! │                                                   │      │
//! │  live:      LiveQueue (FIFO) ──one per tick──► Envelope ─┤
//! │                                                   ▼      │
//! │  HistoryBuffer ◄── push before dispatch ── Action::from_envelope
//! │        │                                          │      │
//! │        └── pop on step-back ──► Action::Restore ──┤      │
//! │                                                   ▼      │
//! │                              ProtocolState::reduce       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler never arms timers itself: it returns [`Effect`]s and the
//! runner executes them. Stage transitions are a pure function ([`advance`]),
//! so the whole engine can be driven deterministically in tests.
//!
//! [`Effect`]: pbftviz_core::Effect

mod config;
mod history;
mod live;
mod scheduler;
mod script;

pub use config::{flight_duration, tick_period, SchedulerConfig};
pub use history::{Cursor, HistoryBuffer, Snapshot};
pub use live::LiveQueue;
pub use scheduler::{Mode, Scheduler, SchedulerStatus};
pub use script::{advance, Script, ScriptCursor, ScriptStage, ScriptedEvent, LOCAL_SID};
