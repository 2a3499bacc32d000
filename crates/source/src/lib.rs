//! Live event source for the PBFT flow visualizer.
//!
//! Generates canonical happy-path rounds, or plays back a recorded stream, and
//! serves them as NDJSON over HTTP.
//! Every envelope is kept in a rolling log so clients can reconnect with
//! `GET /stream?from_eid=K` and continue where they left off.

mod config;
mod generator;
mod handlers;
mod log;
mod replay;
mod routes;
mod server;

pub use config::SourceConfig;
pub use generator::Generator;
pub use handlers::{SourceState, StreamQuery};
pub use log::EventLog;
pub use replay::{Recording, ReplayError};
pub use routes::create_router;
pub use server::{Feed, SourceError, SourceServer, SourceServerHandle};
