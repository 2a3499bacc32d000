//! Stream framing.
//!
//! # Formats
//!
//! ```text
//! NDJSON  (application/x-ndjson):   {"type":"Commit",...}\n
//! SSE     (text/event-stream):      id: 42\n
//!                                   data: {"type":"Commit",...}\n
//!                                   \n
//! ```
//!
//! Bytes arrive in arbitrary chunks; the decoder buffers partial lines until
//! their terminating newline shows up.

use crate::FrameError;
use bytes::BytesMut;
use pbftviz_types::Envelope;

/// How a stream body is split into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    #[default]
    Ndjson,
    Sse,
}

impl Framing {
    /// Pick the framing for a response `Content-Type`. Anything that is not an
    /// event stream is treated as NDJSON.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.trim_start().starts_with("text/event-stream") => Framing::Sse,
            _ => Framing::Ndjson,
        }
    }
}

/// One complete payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: String,
    /// SSE `id:` in effect when the event was dispatched.
    pub id: Option<String>,
}

impl Frame {
    /// Parse the payload as an envelope.
    pub fn envelope(&self) -> Result<Envelope, FrameError> {
        Ok(Envelope::from_json(&self.payload)?)
    }

    /// The SSE id as a numeric event id, when it is one.
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.as_deref().and_then(|id| id.trim().parse().ok())
    }
}

/// Incremental frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    framing: Framing,
    buf: BytesMut,
    // Bytes of `buf` already known to hold no newline.
    scanned: usize,
    // SSE event being assembled.
    data: Vec<String>,
    last_id: Option<String>,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            ..Default::default()
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Feed a chunk and collect every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Frame, FrameError>> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buf.len();
                break;
            };
            let pos = self.scanned + offset;
            self.scanned = 0;
            let mut line = self.buf.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            match std::str::from_utf8(&line) {
                Ok(text) => {
                    if let Some(frame) = self.line(text) {
                        frames.push(Ok(frame));
                    }
                }
                Err(e) => frames.push(Err(FrameError::Utf8(e))),
            }
        }
        frames
    }

    /// Flush at end of stream.
    ///
    /// A trailing NDJSON line without newline is still a frame. An SSE event
    /// without its terminating blank line is incomplete and discarded.
    pub fn finish(&mut self) -> Vec<Result<Frame, FrameError>> {
        let rest = self.buf.split();
        self.scanned = 0;
        self.data.clear();
        if self.framing == Framing::Sse || rest.is_empty() {
            return Vec::new();
        }
        match std::str::from_utf8(&rest) {
            Ok(text) => self.line(text).map(Ok).into_iter().collect(),
            Err(e) => vec![Err(FrameError::Utf8(e))],
        }
    }

    fn line(&mut self, line: &str) -> Option<Frame> {
        match self.framing {
            Framing::Ndjson => {
                let line = line.trim();
                (!line.is_empty()).then(|| Frame {
                    payload: line.to_string(),
                    id: None,
                })
            }
            Framing::Sse => self.sse_line(line),
        }
    }

    fn sse_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let payload = self.data.join("\n");
            self.data.clear();
            return Some(Frame {
                payload,
                id: self.last_id.clone(),
            });
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "id" => self.last_id = Some(value.to_string()),
            // event, retry and unknown fields carry nothing we use.
            _ => {}
        }
        None
    }
}
