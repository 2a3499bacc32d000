//! Event source server.

use crate::{create_router, Generator, Recording, SourceConfig, SourceState};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Errors from the event source server.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Handle for controlling a running source.
pub struct SourceServerHandle {
    server: JoinHandle<()>,
    generator: JoinHandle<()>,
    local_addr: SocketAddr,
    state: SourceState,
}

impl SourceServerHandle {
    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL of the stream endpoint.
    pub fn stream_url(&self) -> String {
        format!("http://{}/stream", self.local_addr)
    }

    pub fn state(&self) -> &SourceState {
        &self.state
    }

    /// Stop generating and serving.
    pub fn abort(&self) {
        self.generator.abort();
        self.server.abort();
    }

    /// Wait for the server to finish.
    pub async fn join(mut self) -> Result<(), tokio::task::JoinError> {
        (&mut self.server).await
    }
}

impl Drop for SourceServerHandle {
    fn drop(&mut self) {
        self.generator.abort();
        self.server.abort();
    }
}

/// Where the source's envelopes come from.
#[derive(Debug, Clone, Default)]
pub enum Feed {
    /// Endless scripted happy-path rounds.
    #[default]
    Generated,
    /// A recorded stream, played back once.
    Replay(Recording),
}

/// HTTP event source.
pub struct SourceServer {
    config: SourceConfig,
    state: SourceState,
    feed: Feed,
}

impl SourceServer {
    pub fn new(config: SourceConfig) -> Self {
        let state = SourceState::new(config.log_limit, config.broadcast_capacity);
        Self {
            config,
            state,
            feed: Feed::Generated,
        }
    }

    pub fn with_feed(mut self, feed: Feed) -> Self {
        self.feed = feed;
        self
    }

    /// Bind, start generating and serve in the background.
    pub async fn start(self) -> Result<SourceServerHandle, SourceError> {
        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        let sid = format!("run-{}", unix_millis());
        let generator = match self.feed {
            Feed::Generated => {
                let session = self.config.session();
                info!(
                    addr = %local_addr,
                    n = session.n(),
                    f = session.f(),
                    eps = self.config.eps,
                    sid = %sid,
                    "Event source listening"
                );
                tokio::spawn(generate(
                    self.state.clone(),
                    Generator::new(session, sid),
                    self.config.clone(),
                ))
            }
            Feed::Replay(recording) => {
                info!(
                    addr = %local_addr,
                    envelopes = recording.len(),
                    eps = self.config.eps,
                    sid = %sid,
                    "Event source listening, replaying recording"
                );
                tokio::spawn(replay(
                    self.state.clone(),
                    recording.with_sid(sid),
                    self.config.clone(),
                ))
            }
        };

        let router = create_router(self.state.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = ?e, "Event source server error");
            }
        });

        Ok(SourceServerHandle {
            server,
            generator,
            local_addr,
            state: self.state,
        })
    }

    /// Start and serve until the server stops.
    pub async fn serve(self) -> Result<(), SourceError> {
        let handle = self.start().await?;
        let _ = handle.join().await;
        Ok(())
    }
}

async fn generate(state: SourceState, mut generator: Generator, config: SourceConfig) {
    let started = Instant::now();
    for envelope in generator.preamble(started.elapsed()) {
        state.publish(envelope).await;
    }

    let mut ticker = tokio::time::interval(config.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let envelope = generator.next_envelope(started.elapsed());
        debug!(
            eid = envelope.eid.0,
            event_type = envelope.event_type.as_str(),
            "Emitting envelope"
        );
        state.publish(envelope).await;
    }
}

async fn replay(state: SourceState, mut recording: Recording, config: SourceConfig) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(config.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(envelope) = recording.next_envelope(started.elapsed()) else {
            info!("Recording played back, serving the log only");
            return;
        };
        debug!(
            eid = envelope.eid.0,
            event_type = envelope.event_type.as_str(),
            remaining = recording.remaining(),
            "Replaying envelope"
        );
        state.publish(envelope).await;
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use futures::StreamExt;
    use pbftviz_types::{Envelope, EventId, EventType, SeqNum};
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_start_binds_and_generates() {
        let config = SourceConfig::default()
            .with_listen_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_eps(100);
        let handle = SourceServer::new(config).start().await.unwrap();

        assert_ne!(handle.local_addr().port(), 0);
        assert!(handle.stream_url().ends_with("/stream"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        // Preamble plus at least a couple of ticks.
        assert!(handle.state().log_len().await >= 3);
        handle.abort();
    }

    #[tokio::test]
    async fn test_replay_streams_recorded_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.ndjson");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"SessionStart","eid":90,"data":{"n":4,"f":1}}"#,
                "\n",
                r#"{"type":"ClientRequest","eid":91,"from":-1,"to":[0]}"#,
                "\n",
                r#"{"type":"PrePrepare","eid":92,"seq":1,"from":0,"to":[1,2,3]}"#,
                "\n",
            ),
        )
        .unwrap();

        let config = SourceConfig::default()
            .with_listen_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_eps(100);
        let handle = SourceServer::new(config)
            .with_feed(Feed::Replay(Recording::load(&path).unwrap()))
            .start()
            .await
            .unwrap();

        let played = tokio::time::timeout(Duration::from_secs(5), async {
            while handle.state().log_len().await < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(played.is_ok());

        // Resume mid-recording through the HTTP route.
        let response = create_router(handle.state().clone())
            .oneshot(
                Request::builder()
                    .uri("/stream?from_eid=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let mut body = response.into_body().into_data_stream();
        let mut text = String::new();
        while text.lines().count() < 2 {
            let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            text.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        let envelopes: Vec<Envelope> = text
            .lines()
            .map(|line| Envelope::from_json(line).unwrap())
            .collect();
        assert_eq!(envelopes[0].eid, EventId(2));
        assert_eq!(envelopes[0].event_type, EventType::ClientRequest);
        assert_eq!(envelopes[1].eid, EventId(3));
        assert_eq!(envelopes[1].seq, SeqNum(1));
        assert!(envelopes[1].sid.starts_with("run-"));

        // Nothing more is generated once the recording is done.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state().log_len().await, 3);
        handle.abort();
    }
}
