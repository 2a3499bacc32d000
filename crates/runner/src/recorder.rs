//! NDJSON envelope recording.

use pbftviz_types::Envelope;
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Failed to write recording {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Appends every received envelope to a file, one JSON object per line.
///
/// The output can be served again by any NDJSON source.
#[derive(Debug)]
pub struct Recorder {
    path: PathBuf,
    out: LineWriter<File>,
    written: u64,
}

impl Recorder {
    /// Create (or truncate) the recording file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| RecorderError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            out: LineWriter::new(file),
            written: 0,
        })
    }

    pub fn record(&mut self, envelope: &Envelope) -> Result<(), RecorderError> {
        let line = envelope.to_json_line()?;
        writeln!(self.out, "{line}").map_err(|source| RecorderError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.written += 1;
        Ok(())
    }

    /// Envelopes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
