#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use hpx_web3_ws::{
    ConnectionDelegate, ErrorCategory, Headers, TransportAdapter, TransportError, TransportEvent,
    TransportResult, WsConfig, WsMessage, WsProvider,
};
use serde_json::Value;
use tokio::{sync::mpsc, time::timeout};

pub const WAIT: Duration = Duration::from_secs(2);

/// Transport adapter driven by the test through a [`MockServer`].
pub struct MockTransport {
    events: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    sent_tx: mpsc::UnboundedSender<WsMessage>,
    connects: Arc<AtomicUsize>,
    failing_sends: Arc<AtomicUsize>,
}

#[async_trait]
impl TransportAdapter for MockTransport {
    async fn connect(&mut self, events: mpsc::Sender<TransportEvent>) -> TransportResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.events.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        self.events.lock().unwrap().take();
        Ok(())
    }

    async fn send(&mut self, message: WsMessage) -> TransportResult<()> {
        let remaining = self.failing_sends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_sends.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::websocket("injected send failure"));
        }
        self.sent_tx
            .send(message)
            .map_err(|_| TransportError::connection_lost("mock server dropped"))
    }
}

/// Test side of a [`MockTransport`].
pub struct MockServer {
    events: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    sent_rx: mpsc::UnboundedReceiver<WsMessage>,
    connects: Arc<AtomicUsize>,
    failing_sends: Arc<AtomicUsize>,
}

pub fn mock_transport() -> (MockTransport, MockServer) {
    let events = Arc::new(Mutex::new(None));
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let connects = Arc::new(AtomicUsize::new(0));
    let failing_sends = Arc::new(AtomicUsize::new(0));

    let transport = MockTransport {
        events: Arc::clone(&events),
        sent_tx,
        connects: Arc::clone(&connects),
        failing_sends: Arc::clone(&failing_sends),
    };
    let server = MockServer {
        events,
        sent_rx,
        connects,
        failing_sends,
    };
    (transport, server)
}

impl MockServer {
    /// Deliver an adapter event to the provider.
    pub async fn inject(&self, event: TransportEvent) {
        let sender = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("provider has not connected");
        sender.send(event).await.expect("provider dropped events");
    }

    /// Finish the handshake.
    pub async fn accept(&self) {
        let mut headers = Headers::new();
        headers.insert("server".to_string(), "mock".to_string());
        self.inject(TransportEvent::Connected { headers }).await;
    }

    /// Push an inbound text frame.
    pub async fn push(&self, text: impl Into<String>) {
        self.inject(TransportEvent::Text(text.into())).await;
    }

    /// Push an inbound JSON frame.
    pub async fn push_json(&self, value: Value) {
        self.push(value.to_string()).await;
    }

    /// Next frame the provider wrote.
    pub async fn next_frame(&mut self) -> WsMessage {
        timeout(WAIT, self.sent_rx.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("transport dropped")
    }

    /// Next frame the provider wrote, decoded as JSON.
    pub async fn next_json(&mut self) -> Value {
        let frame = self.next_frame().await;
        serde_json::from_str(frame.as_text().expect("text frame")).expect("valid JSON")
    }

    /// Assert nothing else was written after a short grace period.
    pub async fn assert_idle(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            self.sent_rx.try_recv().is_err(),
            "unexpected outbound frame"
        );
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make the next `count` sends fail.
    pub fn fail_sends(&self, count: usize) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }
}

/// Delegate that records every callback.
#[derive(Default)]
pub struct RecordingDelegate {
    pub connected: Mutex<Vec<Headers>>,
    pub errors: Mutex<Vec<(ErrorCategory, String)>>,
}

impl ConnectionDelegate for RecordingDelegate {
    fn on_connected(&self, headers: &Headers) {
        self.connected.lock().unwrap().push(headers.clone());
    }

    fn on_error(&self, error: &TransportError) {
        self.errors
            .lock()
            .unwrap()
            .push((error.category(), error.to_string()));
    }
}

impl RecordingDelegate {
    pub fn errors(&self) -> Vec<(ErrorCategory, String)> {
        self.errors.lock().unwrap().clone()
    }

    /// Wait until at least `count` errors were reported.
    pub async fn wait_for_errors(&self, count: usize) -> Vec<(ErrorCategory, String)> {
        timeout(WAIT, async {
            loop {
                let errors = self.errors();
                if errors.len() >= count {
                    return errors;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for delegate errors")
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> WsConfig {
    WsConfig::new("ws://mock.invalid:8546")
}

/// A provider over a mock transport, connected and ready.
pub async fn connected_provider(
    config: WsConfig,
) -> (WsProvider, MockServer, Arc<RecordingDelegate>) {
    let (provider, server, delegate) = idle_provider(config);
    provider.connect().await.unwrap();
    server.accept().await;
    timeout(WAIT, provider.wait_connected())
        .await
        .expect("timed out waiting for connect")
        .unwrap();
    (provider, server, delegate)
}

/// A provider over a mock transport that has not connected yet.
pub fn idle_provider(config: WsConfig) -> (WsProvider, MockServer, Arc<RecordingDelegate>) {
    init_tracing();
    let (transport, server) = mock_transport();
    let delegate = Arc::new(RecordingDelegate::default());
    let provider = WsProvider::new(config, transport, Arc::clone(&delegate)).unwrap();
    (provider, server, delegate)
}

/// Request id of an outbound JSON-RPC frame.
pub fn id_of(frame: &Value) -> u64 {
    frame["id"].as_u64().expect("numeric id")
}
