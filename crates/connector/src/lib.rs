//! Envelope stream connector.
//!
//! Opens a long-lived HTTP stream to an event source, splits it into frames
//! (NDJSON lines or SSE events), parses each frame as an [`Envelope`] and
//! hands it to the consumer in arrival order. A dropped stream is reopened
//! with exponential backoff, resuming from the id after the last envelope
//! already delivered. Malformed frames are logged and skipped.
//!
//! [`Envelope`]: pbftviz_types::Envelope

mod backoff;
mod connector;
mod error;
mod framing;
mod transport;

pub use backoff::RetryPolicy;
pub use connector::{stream_url, Connector, ConnectorConfig, ConnectorEvent};
pub use error::{ConnectorError, FrameError, TransportError};
pub use framing::{Frame, FrameDecoder, Framing};
pub use transport::{ChunkStream, HttpTransport, OpenedStream, Transport};
