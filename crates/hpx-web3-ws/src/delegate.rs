//! Connection event reporting to the owning application.

use std::{collections::HashMap, sync::Arc};

use tracing::{info, warn};

use crate::error::TransportError;

/// Handshake response headers surfaced on connect.
pub type Headers = HashMap<String, String>;

/// Receives connection lifecycle notifications and protocol anomalies.
///
/// Every method has a no-op default. `on_error` is called for transport
/// failures as well as for every frame the provider could not route
/// (unknown response id, unknown subscription id, malformed or binary
/// frames, disconnects). Callbacks run on the connection task and must not
/// block.
pub trait ConnectionDelegate: Send + Sync + 'static {
    /// The socket is open.
    fn on_connected(&self, headers: &Headers) {
        let _ = headers;
    }

    /// Something went wrong.
    fn on_error(&self, error: &TransportError) {
        let _ = error;
    }
}

/// Delegate that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDelegate;

impl ConnectionDelegate for NoopDelegate {}

/// Delegate that forwards notifications to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDelegate;

impl ConnectionDelegate for TracingDelegate {
    fn on_connected(&self, headers: &Headers) {
        info!(?headers, "WebSocket connected");
    }

    fn on_error(&self, error: &TransportError) {
        warn!(error = %error, category = ?error.category(), "WebSocket provider error");
    }
}

impl<D: ConnectionDelegate> ConnectionDelegate for Arc<D> {
    fn on_connected(&self, headers: &Headers) {
        (**self).on_connected(headers);
    }

    fn on_error(&self, error: &TransportError) {
        (**self).on_error(error);
    }
}
