//! File configuration for the `pbftviz` binary.

use pbftviz_connector::{ConnectorConfig, RetryPolicy};
use pbftviz_scheduler::SchedulerConfig;
use pbftviz_types::{ReplicaId, SessionConfig};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewerConfig {
    /// Session shape for scripted mode.
    #[serde(default)]
    pub session: SessionSection,

    /// Pacing and history.
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Live stream connection.
    #[serde(default)]
    pub stream: StreamSection,
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// Replica count.
    #[serde(default = "default_n")]
    pub n: u32,

    /// Tolerated faults (clamped to `(n-1)/3`).
    #[serde(default = "default_f")]
    pub f: u32,

    /// Replicas that stay silent in scripted mode.
    #[serde(default)]
    pub faulty: Vec<u32>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            n: default_n(),
            f: default_f(),
            faulty: Vec::new(),
        }
    }
}

fn default_n() -> u32 {
    4
}

fn default_f() -> u32 {
    1
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Scripted events per second.
    #[serde(default = "default_rate")]
    pub rate: u32,

    /// Live envelopes released per second.
    #[serde(default = "default_rate")]
    pub live_rate: u32,

    /// Snapshots kept for step-back.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            live_rate: default_rate(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_rate() -> u32 {
    3
}

fn default_history_limit() -> usize {
    256
}

/// Stream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    /// Stream endpoint.
    #[serde(default = "default_url")]
    pub url: String,

    /// First reconnect delay in milliseconds.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Exponent at which reconnect delays stop growing.
    #[serde(default = "default_retry_max_exponent")]
    pub retry_max_exponent: u32,

    /// TCP connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Envelopes buffered between the stream task and the scheduler.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Append received envelopes to this NDJSON file.
    #[serde(default)]
    pub record: Option<PathBuf>,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_exponent: default_retry_max_exponent(),
            connect_timeout_ms: default_connect_timeout_ms(),
            channel_capacity: default_channel_capacity(),
            record: None,
        }
    }
}

fn default_url() -> String {
    "http://127.0.0.1:8002/stream".to_string()
}

fn default_retry_base_ms() -> u64 {
    300
}

fn default_retry_max_exponent() -> u32 {
    6
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_channel_capacity() -> usize {
    1024
}

impl ViewerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Clamped session parameters.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.session.n, self.session.f)
    }

    pub fn faulty_set(&self) -> BTreeSet<ReplicaId> {
        self.session.faulty.iter().copied().map(ReplicaId).collect()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_scripted_rate(self.scheduler.rate)
            .with_live_rate(self.scheduler.live_rate)
            .with_history_limit(self.scheduler.history_limit)
    }

    pub fn connector_config(&self) -> ConnectorConfig {
        let retry = RetryPolicy::default()
            .with_base(Duration::from_millis(self.stream.retry_base_ms))
            .with_max_exponent(self.stream.retry_max_exponent);
        ConnectorConfig::new(self.stream.url.clone())
            .with_retry(retry)
            .with_channel_capacity(self.stream.channel_capacity)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.stream.connect_timeout_ms)
    }
}
