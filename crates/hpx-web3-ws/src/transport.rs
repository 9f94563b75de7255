//! Transport adapter abstraction.
//!
//! The provider never touches sockets directly. A [`TransportAdapter`] owns
//! the duplex connection, accepts outbound frames and reports lifecycle
//! changes and inbound frames as [`TransportEvent`]s on the channel it is
//! given at connect time.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{delegate::Headers, error::TransportResult, protocol::WsMessage};

/// Events emitted by a transport adapter.
#[derive(Debug)]
pub enum TransportEvent {
    /// Handshake finished.
    Connected {
        /// Handshake response headers.
        headers: Headers,
    },
    /// The peer or the network closed the connection.
    Disconnected {
        /// Close reason.
        reason: String,
        /// WebSocket close code (1005 when none was sent).
        code: u16,
    },
    /// Inbound text frame.
    Text(String),
    /// Inbound binary frame.
    Binary(Vec<u8>),
    /// Socket level failure; the connection is unusable.
    Error(crate::error::TransportError),
    /// The connection was cancelled locally.
    Cancelled,
}

/// A duplex message connection.
///
/// `connect` only starts the connection; the outcome arrives as events.
/// Implementations emit one `Connected` event once the handshake finishes
/// and a terminal event (`Disconnected`, `Error` or `Cancelled`) when that
/// connection ends. A locally requested `disconnect` produces no event.
#[async_trait]
pub trait TransportAdapter: Send + 'static {
    /// Start a connection. Lifecycle and inbound frames go to `events`.
    ///
    /// Returning `Err` means the attempt could not even start (bad endpoint)
    /// and no event will follow.
    async fn connect(&mut self, events: mpsc::Sender<TransportEvent>) -> TransportResult<()>;

    /// Close the current connection, if any.
    async fn disconnect(&mut self) -> TransportResult<()>;

    /// Send one frame over the open connection.
    async fn send(&mut self, message: WsMessage) -> TransportResult<()>;
}

