//! HTTP handlers and shared state.

use crate::EventLog;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::Json;
use futures::StreamExt;
use pbftviz_types::{Envelope, EventId};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

/// State shared by the generator and every subscriber.
#[derive(Clone)]
pub struct SourceState {
    log: Arc<Mutex<EventLog>>,
    tx: broadcast::Sender<Envelope>,
}

impl SourceState {
    pub fn new(log_limit: usize, broadcast_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            log: Arc::new(Mutex::new(EventLog::new(log_limit))),
            tx,
        }
    }

    /// Log an envelope and fan it out to live subscribers.
    pub async fn publish(&self, envelope: Envelope) {
        let mut log = self.log.lock().await;
        log.push(envelope.clone());
        // No subscribers is fine.
        let _ = self.tx.send(envelope);
    }

    /// Logged envelopes from `from` plus a receiver for everything after them.
    ///
    /// Both are taken under the log lock, so nothing is missed or repeated
    /// between replay and live delivery.
    pub async fn subscribe(&self, from: EventId) -> (Vec<Envelope>, broadcast::Receiver<Envelope>) {
        let log = self.log.lock().await;
        (log.since(from), self.tx.subscribe())
    }

    pub async fn log_len(&self) -> usize {
        self.log.lock().await.len()
    }
}

/// Query parameters of `GET /stream`.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub from_eid: Option<u64>,
}

/// Handler for `GET /health`.
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Handler for `GET /stream`: replay from `from_eid`, then follow live.
pub async fn stream_handler(
    State(state): State<SourceState>,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let from = EventId(query.from_eid.unwrap_or(0));
    let (replay, rx) = state.subscribe(from).await;
    info!(from_eid = from.0, replayed = replay.len(), "Stream subscriber connected");

    let lines = futures::stream::iter(replay)
        .chain(follow(rx))
        .map(|envelope| envelope.to_json_line().map(|line| line + "\n"));

    (
        [
            (CONTENT_TYPE, "application/x-ndjson"),
            (CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
}

/// Live envelopes from a broadcast receiver. A lagging subscriber skips what
/// it missed instead of holding the source back.
fn follow(rx: broadcast::Receiver<Envelope>) -> impl futures::Stream<Item = Envelope> {
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => return Some((envelope, rx)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Stream subscriber lagged, skipping envelopes");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
