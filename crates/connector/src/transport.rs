//! Byte stream transports.

use crate::{Framing, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::time::Duration;

/// Body chunks of an open stream.
pub type ChunkStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// A successfully opened stream.
pub struct OpenedStream {
    pub framing: Framing,
    pub chunks: ChunkStream,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("framing", &self.framing)
            .finish_non_exhaustive()
    }
}

/// Something that can open a long-lived byte stream for a URL.
///
/// The connector owns reconnection and framing; a transport only opens.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: Url) -> Result<OpenedStream, TransportError>;
}

/// Streaming HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport. Only connection setup is bounded by a timeout;
    /// the body may stay open indefinitely.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: Url) -> Result<OpenedStream, TransportError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/x-ndjson, text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let framing = Framing::from_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let chunks = response.bytes_stream().map_err(TransportError::from).boxed();

        Ok(OpenedStream { framing, chunks })
    }
}
