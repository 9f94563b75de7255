//! Connection actor for the provider lifecycle.
//!
//! The actor runs in a background task and owns everything that must not be
//! touched concurrently:
//! - the transport adapter and the connection state machine
//! - the outbound queue, flushed whenever a frame is queued and whenever the
//!   connection enters `Connected`, and retried on a timer after a failed send
//! - the inbound event stream of the current connection, dispatched strictly
//!   in arrival order
//!
//! Every connect attempt gets a fresh event channel. Dropping the previous
//! receiver discards anything still in flight from an old connection.

use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use crate::{
    config::WsConfig,
    delegate::{ConnectionDelegate, Headers},
    dispatcher::Dispatcher,
    error::{TransportError, TransportResult},
    outbound::{Outbound, Outbox},
    pending::PendingRequestStore,
    subscription::SubscriptionStore,
    transport::{TransportAdapter, TransportEvent},
    types::ConnectionState,
};

/// Commands sent from provider handles to the connection actor.
pub(crate) enum ActorCommand {
    /// Start a connection attempt.
    Connect {
        reply: oneshot::Sender<TransportResult<()>>,
    },
    /// Close the connection.
    Disconnect {
        reply: oneshot::Sender<TransportResult<()>>,
    },
    /// Queue a frame for sending.
    Write(Outbound),
}

/// The connection actor.
///
/// It runs as a background task and communicates with
/// [`WsProvider`](crate::provider::WsProvider) handles via channels.
pub(crate) struct ConnectionActor<T: TransportAdapter> {
    config: Arc<WsConfig>,
    transport: T,
    cmd_rx: mpsc::Receiver<ActorCommand>,
    /// Events of the current connection, if one was started.
    events: Option<mpsc::Receiver<TransportEvent>>,
    outbox: Outbox,
    /// When to retry the flush after a failed send.
    retry_at: Option<Instant>,
    pending: Arc<PendingRequestStore>,
    dispatcher: Dispatcher,
    delegate: Arc<dyn ConnectionDelegate>,
    state: watch::Sender<ConnectionState>,
}

impl<T: TransportAdapter> ConnectionActor<T> {
    /// Create a new connection actor.
    pub(crate) fn new(
        config: Arc<WsConfig>,
        transport: T,
        cmd_rx: mpsc::Receiver<ActorCommand>,
        pending: Arc<PendingRequestStore>,
        subscriptions: Arc<SubscriptionStore>,
        delegate: Arc<dyn ConnectionDelegate>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&pending),
            subscriptions,
            Arc::clone(&delegate),
        );
        Self {
            config,
            transport,
            cmd_rx,
            events: None,
            outbox: Outbox::new(),
            retry_at: None,
            pending,
            dispatcher,
            delegate,
            state,
        }
    }

    /// Main entry point: run until every provider handle is dropped.
    pub(crate) async fn run(mut self) {
        info!(url = %self.config.url, "Starting WebSocket provider actor");

        let mut cleanup_interval = tokio::time::interval(self.config.pending_cleanup_interval);
        cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                // Inbound traffic first so responses are not starved by writes
                event = next_event(&mut self.events) => {
                    self.handle_event(event).await;
                }

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            info!("All provider handles dropped; shutting down actor");
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                () = retry_due(self.retry_at) => {
                    trace!(queued = self.outbox.len(), "Retrying flush");
                    self.flush().await;
                }

                _ = cleanup_interval.tick() => {
                    let expired = self.pending.expire_stale();
                    if expired > 0 {
                        debug!(count = expired, "Expired stale pending requests");
                        self.outbox.discard_orphans(|id| self.pending.contains(id));
                    }
                }
            }
        }

        info!("WebSocket provider actor stopped");
    }

    async fn handle_command(&mut self, cmd: ActorCommand) {
        match cmd {
            ActorCommand::Connect { reply } => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            ActorCommand::Disconnect { reply } => {
                let result = self.disconnect().await;
                let _ = reply.send(result);
            }
            ActorCommand::Write(outbound) => {
                self.outbox.push(outbound);
                self.flush().await;
            }
        }
    }

    async fn handle_event(&mut self, event: Option<TransportEvent>) {
        let Some(event) = event else {
            // The adapter dropped its sender without a terminal event.
            self.connection_closed(
                ConnectionState::Disconnected,
                "transport event stream closed",
            );
            return;
        };

        match event {
            TransportEvent::Connected { headers } => self.on_connected(headers).await,
            TransportEvent::Text(text) => {
                if self.check_size(text.len()) {
                    self.dispatcher.on_text(&text);
                }
            }
            TransportEvent::Binary(data) => {
                if self.check_size(data.len()) {
                    self.dispatcher.on_binary(&data);
                }
            }
            TransportEvent::Disconnected { reason, code } => {
                info!(code, reason = %reason, "WebSocket closed by peer");
                self.connection_closed(
                    ConnectionState::Disconnected,
                    format!("{reason} (code {code})"),
                );
            }
            TransportEvent::Cancelled => {
                info!("WebSocket connection cancelled");
                self.connection_closed(ConnectionState::Disconnected, "connection cancelled");
            }
            TransportEvent::Error(err) => {
                warn!(error = %err, "Transport error");
                let reason = err.to_string();
                self.delegate.on_error(&err);
                self.connection_closed(ConnectionState::Errored, reason);
            }
        }
    }

    /// Start a connection attempt unless one is open or in progress.
    async fn connect(&mut self) -> TransportResult<()> {
        let current = *self.state.borrow();
        if matches!(
            current,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            debug!(state = %current, "Connect ignored");
            return Ok(());
        }

        info!(url = %self.config.url, "Connecting to WebSocket");
        let (events_tx, events_rx) = mpsc::channel(self.config.event_channel_capacity);
        self.set_state(ConnectionState::Connecting);

        match self.transport.connect(events_tx).await {
            Ok(()) => {
                self.events = Some(events_rx);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Connection attempt failed to start");
                self.delegate.on_error(&err);
                self.connection_closed(ConnectionState::Errored, err.to_string());
                Err(err)
            }
        }
    }

    /// Close the connection on request. The adapter emits no event for a
    /// local disconnect, so the transition happens here.
    async fn disconnect(&mut self) -> TransportResult<()> {
        let idle = *self.state.borrow() == ConnectionState::Disconnected && self.events.is_none();
        let result = if idle {
            Ok(())
        } else {
            info!(url = %self.config.url, "Disconnecting");
            self.transport.disconnect().await
        };
        // Requests queued before any connection fail here too.
        self.connection_closed(ConnectionState::Disconnected, "disconnected by client");
        result
    }

    async fn on_connected(&mut self, headers: Headers) {
        info!(url = %self.config.url, "WebSocket connected");
        self.set_state(ConnectionState::Connected);
        self.flush().await;
        self.delegate.on_connected(&headers);
    }

    /// Leave the current connection: fail pending requests and drop their
    /// queued frames. Plain frames stay queued for the next connection.
    fn connection_closed(&mut self, next: ConnectionState, reason: impl Into<String>) {
        let reason = reason.into();
        self.events = None;
        self.retry_at = None;
        let previous = self.set_state(next);

        let failed = self.pending.fail_all(&reason);
        let dropped = self.outbox.discard_orphans(|id| self.pending.contains(id));
        if failed > 0 || dropped > 0 {
            debug!(failed, dropped, "Failed pending requests");
        }

        if previous == ConnectionState::Connected {
            self.delegate
                .on_error(&TransportError::connection_lost(reason));
        }
    }

    /// Drain the outbox in order while connected. A failed send keeps the
    /// frame at the head and arms one retry.
    async fn flush(&mut self) {
        self.retry_at = None;
        while self.state.borrow().is_connected() {
            let Some(outbound) = self.outbox.pop() else {
                break;
            };

            // Timed out before it could be written
            if let Some(id) = outbound.request_id
                && !self.pending.contains(&id)
            {
                trace!(request_id = %id, "Skipping frame of a settled request");
                continue;
            }

            trace!(len = outbound.message.len(), "Sending frame");
            if let Err(err) = self.transport.send(outbound.message.clone()).await {
                warn!(error = %err, "Failed to send frame, keeping it queued");
                self.outbox.requeue(outbound);
                self.retry_at = Some(Instant::now() + self.config.flush_retry_interval);
                break;
            }
        }
    }

    fn check_size(&self, len: usize) -> bool {
        let max = self.config.max_message_size;
        if max == 0 || len <= max {
            return true;
        }
        warn!(len, max, "Dropping oversized inbound frame");
        self.delegate.on_error(&TransportError::processing(format!(
            "Inbound frame of {len} bytes exceeds the {max} byte limit"
        )));
        false
    }

    fn set_state(&self, next: ConnectionState) -> ConnectionState {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Connection state changed");
        }
        previous
    }

    async fn shutdown(&mut self) {
        if let Err(err) = self.transport.disconnect().await {
            debug!(error = %err, "Disconnect during shutdown failed");
        }
        self.events = None;
        self.set_state(ConnectionState::Disconnected);
        self.pending.fail_all("provider shut down");
    }
}

/// Resolve once the flush retry deadline passes, or never when none is armed.
async fn retry_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Receive the next event of the current connection, or wait forever when
/// there is none.
async fn next_event(
    events: &mut Option<mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
