//! Playback of recorded NDJSON streams.

use pbftviz_types::{Envelope, EventId};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read recording {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Recording {0} holds no envelopes")]
    Empty(PathBuf),
}

/// Envelopes loaded from a recording, in file order.
///
/// Lines that do not decode are skipped with a warning, the same way the
/// connector treats malformed payloads.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    envelopes: Vec<Envelope>,
    next: usize,
    next_eid: EventId,
    sid: String,
}

impl Recording {
    /// Load an NDJSON file written by the viewer's recorder.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let recording = Self::parse(&text);
        if recording.is_empty() {
            return Err(ReplayError::Empty(path.to_path_buf()));
        }
        Ok(recording)
    }

    pub fn parse(text: &str) -> Self {
        let envelopes = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(index, line)| match Envelope::from_json(line.trim()) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    warn!(line = index + 1, error = %e, "Skipping undecodable recording line");
                    None
                }
            })
            .collect();
        Self {
            envelopes,
            next: 0,
            next_eid: EventId(1),
            sid: String::new(),
        }
    }

    /// Session id stamped onto played-back envelopes.
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = sid.into();
        self
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    /// Envelopes not played yet.
    pub fn remaining(&self) -> usize {
        self.envelopes.len() - self.next
    }

    /// Next recorded envelope, re-stamped for this source.
    ///
    /// Eids are renumbered from 1 so `from_eid` resumption works even when
    /// the recording spans several upstream sessions. Everything else but
    /// `ts` and `sid` is served as recorded.
    pub fn next_envelope(&mut self, ts: Duration) -> Option<Envelope> {
        let recorded = self.envelopes.get(self.next)?.clone();
        self.next += 1;
        let eid = self.next_eid;
        self.next_eid = eid.next();
        Some(Envelope {
            eid,
            ts: ts.as_micros() as u64,
            sid: self.sid.clone(),
            ..recorded
        })
    }
}
