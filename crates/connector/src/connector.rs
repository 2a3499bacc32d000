//! The reconnecting stream task and its handle.

use crate::{ConnectorError, Frame, FrameDecoder, FrameError, RetryPolicy, Transport};
use futures::StreamExt;
use pbftviz_types::{ConnectionStatus, Envelope, EventId};
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connector configuration.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Stream endpoint, e.g. `http://127.0.0.1:8002/stream`.
    pub endpoint: String,

    /// Reconnect delays.
    pub retry: RetryPolicy,

    /// Events buffered between the stream task and the consumer.
    pub channel_capacity: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8002/stream".to_string(),
            retry: RetryPolicy::default(),
            channel_capacity: 1024,
        }
    }
}

impl ConnectorConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Output of the stream task, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    Envelope(Envelope),
    Status(ConnectionStatus),
}

/// `endpoint` with `from_eid` set when resuming. A `from_eid` already in the
/// endpoint is replaced, other query pairs are kept.
pub fn stream_url(endpoint: &Url, resume_from: Option<EventId>) -> Url {
    let Some(eid) = resume_from else {
        return endpoint.clone();
    };
    let kept: Vec<(String, String)> = endpoint
        .query_pairs()
        .filter(|(key, _)| key != "from_eid")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = endpoint.clone();
    url.set_query(None);
    url.query_pairs_mut()
        .extend_pairs(kept)
        .append_pair("from_eid", &eid.0.to_string());
    url
}

/// Handle to at most one running stream task.
///
/// Dropping the handle or calling [`disconnect`](Connector::disconnect)
/// aborts the task. Events from an aborted task are never delivered: each
/// connection gets its own channel.
pub struct Connector<T: Transport> {
    transport: Arc<T>,
    config: ConnectorConfig,
    task: Option<JoinHandle<()>>,
    events: Option<mpsc::Receiver<ConnectorEvent>>,
    status: watch::Sender<ConnectionStatus>,
}

impl<T: Transport> Connector<T> {
    pub fn new(transport: T, config: ConnectorConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            transport: Arc::new(transport),
            config,
            task: None,
            events: None,
            status,
        }
    }

    /// Open the stream unless a stream task is already running.
    ///
    /// `resume_from` is sent as `from_eid` on the first request; later
    /// reconnects resume after the newest envelope delivered.
    pub fn connect(&mut self, resume_from: Option<EventId>) -> Result<(), ConnectorError> {
        if self.is_running() {
            debug!("Stream task already running, ignoring connect");
            return Ok(());
        }

        let endpoint =
            Url::parse(&self.config.endpoint).map_err(|e| ConnectorError::InvalidEndpoint {
                endpoint: self.config.endpoint.clone(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        self.status.send_replace(ConnectionStatus::Connecting);
        info!(endpoint = %endpoint, resume_from = ?resume_from.map(|e| e.0), "Connecting to stream");

        let stream = StreamTask {
            transport: Arc::clone(&self.transport),
            endpoint,
            resume_from,
            retry: self.config.retry.clone(),
            tx,
            status: self.status.clone(),
        };
        self.task = Some(tokio::spawn(stream.run()));
        self.events = Some(rx);
        Ok(())
    }

    /// Abort the stream task and drop anything it had queued.
    pub fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Disconnected from stream");
        }
        self.events = None;
        self.status.send_replace(ConnectionStatus::Disconnected);
    }

    /// Next event from the current connection.
    ///
    /// Pending forever while disconnected, so it can sit in a `select!`.
    pub async fn next_event(&mut self) -> Option<ConnectorEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch connection status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl<T: Transport> Drop for Connector<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct StreamTask<T: Transport> {
    transport: Arc<T>,
    endpoint: Url,
    resume_from: Option<EventId>,
    retry: RetryPolicy,
    tx: mpsc::Sender<ConnectorEvent>,
    status: watch::Sender<ConnectionStatus>,
}

impl<T: Transport> StreamTask<T> {
    async fn run(mut self) {
        loop {
            if self.session().await.is_err() {
                // Consumer went away.
                return;
            }

            if self.set_status(ConnectionStatus::Connecting).await.is_err() {
                return;
            }
            let attempt = self.retry.attempt();
            let delay = self.retry.next_delay();
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
            tokio::time::sleep(delay).await;
        }
    }

    /// Open one stream and forward it until it ends. `Err` means the consumer
    /// is gone and the task should stop.
    async fn session(&mut self) -> Result<(), Closed> {
        let url = stream_url(&self.endpoint, self.resume_from);
        let opened = match self.transport.open(url).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(error = %e, attempt = self.retry.attempt(), "Failed to open stream");
                return Ok(());
            }
        };

        self.retry.reset();
        self.set_status(ConnectionStatus::Connected).await?;

        let mut decoder = FrameDecoder::new(opened.framing);
        let mut chunks = opened.chunks;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in decoder.push(&bytes) {
                        self.deliver(frame).await?;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Stream read failed");
                    return Ok(());
                }
            }
        }
        for frame in decoder.finish() {
            self.deliver(frame).await?;
        }
        info!("Stream ended by source");
        Ok(())
    }

    async fn deliver(&mut self, frame: Result<Frame, FrameError>) -> Result<(), Closed> {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Discarding undecodable frame");
                return Ok(());
            }
        };
        if let Some(id) = frame.numeric_id() {
            self.advance_resume(EventId(id).next());
        }

        match frame.envelope() {
            Ok(envelope) => {
                self.advance_resume(envelope.eid.next());
                self.tx
                    .send(ConnectorEvent::Envelope(envelope))
                    .await
                    .map_err(|_| Closed)
            }
            Err(e) => {
                warn!(error = %e, "Discarding malformed envelope");
                Ok(())
            }
        }
    }

    fn advance_resume(&mut self, next: EventId) {
        if self.resume_from.map_or(true, |current| next > current) {
            self.resume_from = Some(next);
        }
    }

    async fn set_status(&mut self, status: ConnectionStatus) -> Result<(), Closed> {
        let previous = self.status.send_replace(status);
        if previous == status {
            return Ok(());
        }
        self.tx
            .send(ConnectorEvent::Status(status))
            .await
            .map_err(|_| Closed)
    }
}

struct Closed;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Framing, OpenedStream, TransportError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use pbftviz_types::{EventType, Participant, ReplicaId, SeqNum};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;
    use tracing_test::traced_test;

    enum Script {
        Fail,
        /// Chunks, then end of stream.
        Finite(Framing, Vec<Vec<u8>>),
        /// Chunks, then stay open.
        Open(Framing, Vec<Vec<u8>>),
    }

    #[derive(Clone, Default)]
    struct FakeTransport {
        script: Arc<Mutex<VecDeque<Script>>>,
        opened: Arc<Mutex<Vec<(Url, Instant)>>>,
    }

    impl FakeTransport {
        fn new(script: Vec<Script>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                opened: Arc::default(),
            }
        }

        fn opened(&self) -> Vec<(Url, Instant)> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn open(&self, url: Url) -> Result<OpenedStream, TransportError> {
            self.opened.lock().unwrap().push((url, Instant::now()));
            let next = self.script.lock().unwrap().pop_front();
            let (framing, chunks, stay_open) = match next {
                Some(Script::Fail) => return Err(TransportError::Status(503)),
                Some(Script::Finite(framing, chunks)) => (framing, chunks, false),
                Some(Script::Open(framing, chunks)) => (framing, chunks, true),
                None => (Framing::Ndjson, vec![], true),
            };
            let body = futures::stream::iter(
                chunks
                    .into_iter()
                    .map(|c| Ok::<_, TransportError>(Bytes::from(c))),
            );
            let chunks = if stay_open {
                body.chain(futures::stream::pending()).boxed()
            } else {
                body.boxed()
            };
            Ok(OpenedStream { framing, chunks })
        }
    }

    fn line(eid: u64) -> String {
        let env = Envelope::new(
            EventType::Commit,
            EventId(eid),
            SeqNum(1),
            Participant::Replica(ReplicaId(1)),
            &[],
        );
        format!("{}\n", env.to_json_line().unwrap())
    }

    fn connector(transport: &FakeTransport) -> Connector<FakeTransport> {
        Connector::new(
            transport.clone(),
            ConnectorConfig::new("http://source.test/stream"),
        )
    }

    async fn next(connector: &mut Connector<FakeTransport>) -> ConnectorEvent {
        tokio::time::timeout(Duration::from_secs(60), connector.next_event())
            .await
            .expect("event before timeout")
            .expect("channel open")
    }

    fn eid_of(event: ConnectorEvent) -> u64 {
        match event {
            ConnectorEvent::Envelope(env) => env.eid.0,
            other => panic!("expected envelope, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_delivers_in_order_and_skips_malformed() {
        let two = line(2);
        let (head, tail) = two.split_at(10);
        let transport = FakeTransport::new(vec![Script::Open(
            Framing::Ndjson,
            vec![
                format!("{}{}", line(1), head).into_bytes(),
                format!("{}not json\n{{\"type\":\"Nope\",\"eid\":9}}\n{}", tail, line(3))
                    .into_bytes(),
            ],
        )]);
        let mut connector = connector(&transport);
        connector.connect(Some(EventId(5))).unwrap();

        assert_eq!(
            next(&mut connector).await,
            ConnectorEvent::Status(ConnectionStatus::Connected)
        );
        assert_eq!(eid_of(next(&mut connector).await), 1);
        assert_eq!(eid_of(next(&mut connector).await), 2);
        assert_eq!(eid_of(next(&mut connector).await), 3);
        assert_eq!(connector.status(), ConnectionStatus::Connected);

        let opened = transport.opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].0.query(), Some("from_eid=5"));
        assert!(logs_contain("Discarding malformed envelope"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_with_backoff_and_resumes() {
        let transport = FakeTransport::new(vec![
            Script::Fail,
            Script::Fail,
            Script::Finite(Framing::Ndjson, vec![format!("{}{}", line(1), line(2)).into_bytes()]),
        ]);
        let mut connector = connector(&transport);
        connector.connect(None).unwrap();

        assert_eq!(
            next(&mut connector).await,
            ConnectorEvent::Status(ConnectionStatus::Connected)
        );
        assert_eq!(eid_of(next(&mut connector).await), 1);
        assert_eq!(eid_of(next(&mut connector).await), 2);
        assert_eq!(
            next(&mut connector).await,
            ConnectorEvent::Status(ConnectionStatus::Connecting)
        );
        assert_eq!(
            next(&mut connector).await,
            ConnectorEvent::Status(ConnectionStatus::Connected)
        );

        let opened = transport.opened();
        assert_eq!(opened.len(), 4);
        let gaps: Vec<_> = opened.windows(2).map(|w| w[1].1 - w[0].1).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(300),
                Duration::from_millis(600),
                // The successful open reset the attempt counter.
                Duration::from_millis(300),
            ]
        );
        assert_eq!(opened[2].0.query(), None);
        assert_eq!(opened[3].0.query(), Some("from_eid=3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sse_ids_advance_resume_point() {
        let body = format!(
            "id: 7\ndata: {}\n\nid: 12\ndata: not json\n\n",
            line(7).trim_end()
        );
        let transport =
            FakeTransport::new(vec![Script::Finite(Framing::Sse, vec![body.into_bytes()])]);
        let mut connector = connector(&transport);
        connector.connect(None).unwrap();

        assert_eq!(
            next(&mut connector).await,
            ConnectorEvent::Status(ConnectionStatus::Connected)
        );
        assert_eq!(eid_of(next(&mut connector).await), 7);
        assert_eq!(
            next(&mut connector).await,
            ConnectorEvent::Status(ConnectionStatus::Connecting)
        );
        assert_eq!(
            next(&mut connector).await,
            ConnectorEvent::Status(ConnectionStatus::Connected)
        );
        assert_eq!(transport.opened()[1].0.query(), Some("from_eid=13"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_delivery() {
        let transport = FakeTransport::new(vec![Script::Open(
            Framing::Ndjson,
            vec![line(1).into_bytes()],
        )]);
        let mut connector = connector(&transport);
        connector.connect(None).unwrap();
        next(&mut connector).await;
        assert_eq!(eid_of(next(&mut connector).await), 1);

        connector.disconnect();
        assert_eq!(connector.status(), ConnectionStatus::Disconnected);
        assert!(!connector.is_running());
        let waited =
            tokio::time::timeout(Duration::from_secs(5), connector.next_event()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let transport = FakeTransport::new(vec![]);
        let mut connector = connector(&transport);
        let mut status = connector.subscribe_status();

        connector.connect(None).unwrap();
        connector.connect(Some(EventId(3))).unwrap();
        next(&mut connector).await;

        assert_eq!(transport.opened().len(), 1);
        assert_eq!(*status.borrow_and_update(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_invalid_endpoint_is_rejected() {
        let mut connector = Connector::new(
            FakeTransport::default(),
            ConnectorConfig::new("not a url"),
        );
        let result = connector.connect(None);
        assert!(matches!(result, Err(ConnectorError::InvalidEndpoint { .. })));
        assert_eq!(connector.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_stream_url() {
        let base = Url::parse("http://source.test/stream").unwrap();
        assert_eq!(stream_url(&base, None).as_str(), "http://source.test/stream");
        assert_eq!(
            stream_url(&base, Some(EventId(42))).as_str(),
            "http://source.test/stream?from_eid=42"
        );

        let configured = Url::parse("http://source.test/stream?from_eid=3&session=a").unwrap();
        assert_eq!(stream_url(&configured, None), configured);
        assert_eq!(
            stream_url(&configured, Some(EventId(42))).as_str(),
            "http://source.test/stream?session=a&from_eid=42"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_eid_keeps_task_alive() {
        let transport = FakeTransport::new(vec![
            Script::Finite(Framing::Ndjson, vec![line(u64::MAX).into_bytes()]),
            Script::Open(Framing::Ndjson, vec![]),
        ]);
        let mut connector = connector(&transport);
        connector.connect(None).unwrap();

        assert_eq!(
            next(&mut connector).await,
            ConnectorEvent::Status(ConnectionStatus::Connected)
        );
        assert_eq!(eid_of(next(&mut connector).await), u64::MAX);
        assert_eq!(
            next(&mut connector).await,
            ConnectorEvent::Status(ConnectionStatus::Connecting)
        );
        assert_eq!(
            next(&mut connector).await,
            ConnectorEvent::Status(ConnectionStatus::Connected)
        );
        assert!(connector.is_running());
        assert_eq!(
            transport.opened()[1].0.query(),
            Some("from_eid=18446744073709551615")
        );
    }
}
