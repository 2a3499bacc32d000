//! Process-level driver for the PBFT flow visualizer engine.
//!
//! The [`Runner`] owns a [`Scheduler`](pbftviz_scheduler::Scheduler) and the
//! I/O it needs: tokio timers, the stream [`Connector`](pbftviz_connector::Connector)
//! and an optional envelope [`Recorder`]. Consumers talk to it through a
//! [`RunnerHandle`] and read the protocol view from a watch channel.

pub mod config;
pub mod observer;
pub mod recorder;
mod runner;
pub mod timers;

pub use config::{ConfigError, ViewerConfig};
pub use recorder::{Recorder, RecorderError};
pub use runner::{Runner, RunnerError, RunnerHandle, ShutdownHandle};
pub use timers::{TimerFired, TimerManager};
