//! User-facing provider API.
//!
//! A [`WsProvider`] multiplexes correlated JSON-RPC requests and
//! subscription event streams over one WebSocket connection.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::{
    actor::{ActorCommand, ConnectionActor},
    config::WsConfig,
    delegate::ConnectionDelegate,
    error::{TransportError, TransportResult},
    filter::SubscribeEventFilter,
    outbound::Outbound,
    pending::PendingRequestStore,
    protocol::{Method, RpcRequest, WsMessage},
    subscription::{ProvisionalSubscription, Subscription, SubscriptionState, SubscriptionStore},
    transport::TransportAdapter,
    types::{ConnectionState, RequestId, SubscriptionId},
    ws_transport::TungsteniteTransport,
};

/// Receiver half of [`WsProvider::subscribe_channel`].
pub type EventReceiver = mpsc::Receiver<TransportResult<Value>>;

/// WebSocket JSON-RPC provider.
///
/// The provider is cheap to clone and can be shared across tasks. The
/// connection itself lives in a background actor that stops once every
/// clone (including the ones held by [`Subscription`] handles) is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let config = WsConfig::new("wss://mainnet.example.org/ws");
/// let provider = WsProvider::connect_to(config, TracingDelegate).await?;
///
/// let subscription = provider
///     .subscribe(SubscribeEventFilter::NewHeads, |head| {
///         tracing::info!(?head, "New head");
///     })
///     .await?;
///
/// subscription.unsubscribe().await?;
/// ```
#[derive(Clone)]
pub struct WsProvider {
    /// Channel to send commands to the actor.
    cmd_tx: mpsc::Sender<ActorCommand>,
    /// Connection state published by the actor.
    state_rx: watch::Receiver<ConnectionState>,
    /// Shared pending request store.
    pending: Arc<PendingRequestStore>,
    /// Shared subscription store.
    subscriptions: Arc<SubscriptionStore>,
    delegate: Arc<dyn ConnectionDelegate>,
    config: Arc<WsConfig>,
}

impl WsProvider {
    /// Create a provider over `transport` without connecting.
    ///
    /// Spawns the connection actor, so this must run inside a Tokio runtime.
    pub fn new<T, D>(config: WsConfig, transport: T, delegate: D) -> TransportResult<Self>
    where
        T: TransportAdapter,
        D: ConnectionDelegate,
    {
        config.validate().map_err(TransportError::config)?;

        let config = Arc::new(config);
        let delegate: Arc<dyn ConnectionDelegate> = Arc::new(delegate);
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_channel_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let pending = Arc::new(PendingRequestStore::new(Arc::clone(&config)));
        let subscriptions = Arc::new(SubscriptionStore::new());

        let actor = ConnectionActor::new(
            Arc::clone(&config),
            transport,
            cmd_rx,
            Arc::clone(&pending),
            Arc::clone(&subscriptions),
            Arc::clone(&delegate),
            state_tx,
        );
        tokio::spawn(actor.run());

        info!(url = %config.url, "WebSocket provider created");

        Ok(Self {
            cmd_tx,
            state_rx,
            pending,
            subscriptions,
            delegate,
            config,
        })
    }

    /// Create a provider backed by `tokio-tungstenite` and start connecting.
    pub async fn connect_to<D>(config: WsConfig, delegate: D) -> TransportResult<Self>
    where
        D: ConnectionDelegate,
    {
        let transport = TungsteniteTransport::from_config(&config);
        let provider = Self::new(config, transport, delegate)?;
        provider.connect().await?;
        Ok(provider)
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Start connecting. Returns once the attempt has started; watch
    /// [`state`](Self::state) or call [`wait_connected`](Self::wait_connected)
    /// for the outcome. A no-op while connected or connecting.
    pub async fn connect(&self) -> TransportResult<()> {
        let (reply, rx) = oneshot::channel();
        self.command(ActorCommand::Connect { reply }).await?;
        rx.await.unwrap_or_else(|_| Err(actor_gone()))
    }

    /// Close the connection and fail every pending request.
    pub async fn disconnect(&self) -> TransportResult<()> {
        let (reply, rx) = oneshot::channel();
        self.command(ActorCommand::Disconnect { reply }).await?;
        rx.await.unwrap_or_else(|_| Err(actor_gone()))
    }

    /// Wait until the current connection attempt settles.
    ///
    /// Fails if the attempt ends in any state other than `Connected`.
    pub async fn wait_connected(&self) -> TransportResult<()> {
        let mut rx = self.state_rx.clone();
        let state = *rx
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .map_err(|_| actor_gone())?;

        if state.is_connected() {
            Ok(())
        } else {
            Err(TransportError::connection_lost(format!(
                "connection attempt ended {state}"
            )))
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Check if the socket is open.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Configured endpoint.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    // ========================================================================
    // Request-Response API
    // ========================================================================

    /// Send a correlated request and await its result.
    ///
    /// Only `eth_subscribe` and `eth_unsubscribe` are accepted; other methods
    /// fail with [`TransportError::UnsupportedOperation`] before an id is
    /// allocated. The request is buffered while disconnected and fails with
    /// [`TransportError::ConnectionLost`] if the connection drops before the
    /// response arrives.
    pub async fn send_request(
        &self,
        method: impl Into<Method>,
        params: Vec<Value>,
    ) -> TransportResult<Value> {
        let method = method.into();
        if !method.is_streaming() {
            return Err(TransportError::unsupported_operation(method.as_str()));
        }

        let (id, rx) = self.pending.add()?;
        let guard = PendingGuard::new(&self.pending, id);
        let message = RpcRequest::new(id, &method, params).to_message()?;

        trace!(request_id = %id, method = %method, "Queueing request");
        self.command(ActorCommand::Write(Outbound::request(message, id))).await?;
        guard.disarm();

        rx.await
            .unwrap_or_else(|_| Err(TransportError::connection_lost("response channel dropped")))
    }

    /// Batch requests are not supported over this provider.
    pub async fn send_batch(
        &self,
        _requests: Vec<(Method, Vec<Value>)>,
    ) -> TransportResult<Vec<Value>> {
        Err(TransportError::input(
            "Batch requests are not supported over WebSocket, use send_request",
        ))
    }

    // ========================================================================
    // Raw writes
    // ========================================================================

    /// Queue a raw frame. Sent immediately while connected, otherwise on the
    /// next connect.
    pub async fn write_message(&self, message: WsMessage) -> TransportResult<()> {
        self.command(ActorCommand::Write(Outbound::message(message)))
            .await
    }

    /// Queue any serializable value as a JSON text frame.
    pub async fn write_value<T: Serialize + ?Sized>(&self, value: &T) -> TransportResult<()> {
        self.write_message(WsMessage::json(value)?).await
    }

    /// Queue a JSON-RPC request with a fresh id without tracking its
    /// response. Any method is accepted; the response, if any, is reported
    /// as an unknown id.
    pub async fn write_rpc(
        &self,
        method: impl Into<Method>,
        params: Vec<Value>,
    ) -> TransportResult<RequestId> {
        let method = method.into();
        let id = self.pending.next_id();
        let message = RpcRequest::new(id, &method, params).to_message()?;
        self.write_message(message).await?;
        Ok(id)
    }

    // ========================================================================
    // Subscription API
    // ========================================================================

    /// Subscribe to `filter` and deliver every event to `listener`.
    ///
    /// Returns as soon as the subscribe request is queued; the handle starts
    /// [`Provisional`](SubscriptionState::Provisional) and becomes active
    /// when the server assigns an id. If the request fails the listener is
    /// called once with the error.
    pub async fn subscribe<F>(
        &self,
        filter: SubscribeEventFilter,
        listener: F,
    ) -> TransportResult<Subscription>
    where
        F: Fn(TransportResult<Value>) + Send + Sync + 'static,
    {
        let params = filter.to_params()?;
        let (state, _) = watch::channel(SubscriptionState::Provisional);
        let state = Arc::new(state);
        let provisional = ProvisionalSubscription {
            state: Arc::clone(&state),
            listener: Arc::new(listener),
            store: Arc::clone(&self.subscriptions),
            delegate: Arc::clone(&self.delegate),
        };

        let id = self.pending.add_subscription(provisional)?;
        let guard = PendingGuard::new(&self.pending, id);
        let message = RpcRequest::new(id, &Method::Subscribe, params).to_message()?;

        self.command(ActorCommand::Write(Outbound::request(message, id))).await?;
        guard.disarm();

        debug!(request_id = %id, kind = filter.kind(), "Subscribe request queued");
        Ok(Subscription::new(state, self.clone()))
    }

    /// Subscribe and receive events through a bounded channel.
    ///
    /// Events are dropped with a warning when the receiver falls behind by
    /// more than `subscription_channel_capacity`.
    pub async fn subscribe_channel(
        &self,
        filter: SubscribeEventFilter,
    ) -> TransportResult<(Subscription, EventReceiver)> {
        let (tx, rx) = mpsc::channel(self.config.subscription_channel_capacity);
        let kind = filter.kind();
        let subscription = self
            .subscribe(filter, move |event| match tx.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(kind, "Subscription receiver lagging, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!(kind, "Subscription receiver dropped");
                }
            })
            .await?;
        Ok((subscription, rx))
    }

    /// Subscribe with events decoded into `R`.
    ///
    /// Events that fail to decode reach the listener as
    /// [`TransportError::Serialization`].
    pub async fn subscribe_typed<R, F>(
        &self,
        filter: SubscribeEventFilter,
        listener: F,
    ) -> TransportResult<Subscription>
    where
        R: DeserializeOwned,
        F: Fn(TransportResult<R>) + Send + Sync + 'static,
    {
        self.subscribe(filter, move |event: TransportResult<Value>| {
            listener(event.and_then(|value| serde_json::from_value(value).map_err(Into::into)));
        })
        .await
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check whether `id` is an active subscription.
    pub fn has_subscription(&self, id: &SubscriptionId) -> bool {
        self.subscriptions.contains(id)
    }

    /// Ids of all active subscriptions.
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.subscriptions.ids()
    }

    /// Forget every active subscription locally without notifying the
    /// server. Later events for those ids are reported as unknown.
    pub fn clear_subscriptions(&self) {
        let count = self.subscriptions.len();
        self.subscriptions.clear();
        debug!(count, "Cleared subscriptions");
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn delegate(&self) -> Arc<dyn ConnectionDelegate> {
        Arc::clone(&self.delegate)
    }

    pub(crate) fn subscriptions(&self) -> &SubscriptionStore {
        &self.subscriptions
    }

    async fn command(&self, cmd: ActorCommand) -> TransportResult<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| actor_gone())
    }
}

fn actor_gone() -> TransportError {
    TransportError::connection_lost("provider actor shut down")
}

/// Removes a pending entry unless its frame reached the actor, so a caller
/// that gives up early does not hold a slot.
struct PendingGuard<'a> {
    pending: &'a PendingRequestStore,
    id: Option<RequestId>,
}

impl<'a> PendingGuard<'a> {
    fn new(pending: &'a PendingRequestStore, id: RequestId) -> Self {
        Self {
            pending,
            id: Some(id),
        }
    }

    fn disarm(mut self) {
        self.id = None;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take()
            && self.pending.remove(&id)
        {
            trace!(request_id = %id, "Dropped request that was never queued");
        }
    }
}
