//! [`TransportAdapter`] backed by `tokio-tungstenite`.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    net::TcpStream,
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, client::IntoClientRequest},
};
use tracing::{debug, trace};

use crate::{
    config::WsConfig,
    delegate::Headers,
    error::{TransportError, TransportResult},
    protocol::WsMessage,
    transport::{TransportAdapter, TransportEvent},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SharedWriter = Arc<Mutex<Option<SplitSink<WsStream, Message>>>>;

/// WebSocket transport over TCP or TLS.
///
/// Each connect spawns a task that performs the handshake, publishes the
/// write half and then forwards inbound frames as [`TransportEvent`]s.
pub struct TungsteniteTransport {
    url: String,
    connect_timeout: Duration,
    writer: SharedWriter,
    task: Option<JoinHandle<()>>,
}

impl TungsteniteTransport {
    /// Create a transport for `url`.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            writer: Arc::new(Mutex::new(None)),
            task: None,
        }
    }

    /// Create a transport from provider configuration.
    pub fn from_config(config: &WsConfig) -> Self {
        Self::new(config.url.clone(), config.connect_timeout)
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TungsteniteTransport {
    fn drop(&mut self) {
        self.stop_task();
    }
}

#[async_trait]
impl TransportAdapter for TungsteniteTransport {
    async fn connect(&mut self, events: mpsc::Sender<TransportEvent>) -> TransportResult<()> {
        self.url
            .as_str()
            .into_client_request()
            .map_err(|e| {
                TransportError::config(format!("Invalid WebSocket URL {}: {e}", self.url))
            })?;

        self.stop_task();
        self.writer.lock().await.take();

        let url = self.url.clone();
        let connect_timeout = self.connect_timeout;
        let writer = Arc::clone(&self.writer);
        self.task = Some(tokio::spawn(async move {
            run_connection(url, connect_timeout, writer, events).await;
        }));
        Ok(())
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        self.stop_task();
        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            sink.close().await?;
        }
        Ok(())
    }

    async fn send(&mut self, message: WsMessage) -> TransportResult<()> {
        let mut guard = self.writer.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(TransportError::connection_lost("WebSocket is not connected"));
        };

        let frame = match message {
            WsMessage::Text(text) => Message::text(text),
            WsMessage::Binary(data) => Message::binary(data),
        };
        sink.send(frame).await.map_err(Into::into)
    }
}

async fn run_connection(
    url: String,
    connect_timeout: Duration,
    writer: SharedWriter,
    events: mpsc::Sender<TransportEvent>,
) {
    debug!(url = %url, "Opening WebSocket");
    let (ws, response) = match timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok(pair)) => pair,
        Ok(Err(err)) => {
            let _ = events.send(TransportEvent::Error(err.into())).await;
            return;
        }
        Err(_) => {
            let _ = events
                .send(TransportEvent::Error(TransportError::timeout(connect_timeout)))
                .await;
            return;
        }
    };

    let headers: Headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    let (sink, stream) = ws.split();
    *writer.lock().await = Some(sink);

    if events
        .send(TransportEvent::Connected { headers })
        .await
        .is_err()
    {
        return;
    }

    read_loop(stream, &events).await;
    writer.lock().await.take();
}

async fn read_loop(mut stream: SplitStream<WsStream>, events: &mpsc::Sender<TransportEvent>) {
    while let Some(message) = stream.next().await {
        let event = match message {
            Ok(Message::Text(text)) => TransportEvent::Text(text.to_string()),
            Ok(Message::Binary(data)) => TransportEvent::Binary(data.to_vec()),
            Ok(Message::Close(frame)) => {
                let (code, reason): (u16, String) = frame
                    .map(|cf| (cf.code.into(), cf.reason.to_string()))
                    .unwrap_or((1005, String::new()));
                let _ = events
                    .send(TransportEvent::Disconnected { reason, code })
                    .await;
                return;
            }
            // Control frames are answered by tungstenite itself.
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                trace!("Skipping control frame");
                continue;
            }
            Err(err) => {
                let _ = events.send(TransportEvent::Error(err.into())).await;
                return;
            }
        };

        if events.send(event).await.is_err() {
            return;
        }
    }

    let _ = events
        .send(TransportEvent::Disconnected {
            reason: "stream ended".to_string(),
            code: 1006,
        })
        .await;
}
