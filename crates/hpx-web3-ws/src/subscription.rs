//! Subscription registry and lifecycle.
//!
//! A subscription starts `Provisional` the moment its `eth_subscribe`
//! request is issued. When the server id arrives the entry is inserted into
//! the [`SubscriptionStore`] and becomes `Active`; only active entries are
//! visible to dispatch. A confirmed `eth_unsubscribe` removes it.

use std::{fmt, sync::Arc};

use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    delegate::ConnectionDelegate,
    error::{TransportError, TransportResult},
    protocol::Method,
    provider::WsProvider,
    types::SubscriptionId,
};

/// Callback invoked with every event of a subscription.
pub type Listener = Arc<dyn Fn(TransportResult<Value>) + Send + Sync>;

/// Lifecycle of a single subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Subscribe request sent, server id not known yet.
    Provisional,
    /// Registered under its server id and receiving events.
    Active(SubscriptionId),
    /// Unsubscribe confirmed by the server.
    Removed(SubscriptionId),
    /// The subscribe request failed; the subscription never became active.
    Failed,
}

impl SubscriptionState {
    /// Server id, once assigned.
    pub fn id(&self) -> Option<&SubscriptionId> {
        match self {
            Self::Active(id) | Self::Removed(id) => Some(id),
            Self::Provisional | Self::Failed => None,
        }
    }

    /// Returns true while the server id is still unknown.
    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional)
    }
}

struct SubscriptionEntry {
    listener: Listener,
}

/// Lock-free store of active subscriptions keyed by server id.
pub struct SubscriptionStore {
    subscriptions: scc::HashMap<SubscriptionId, SubscriptionEntry>,
}

impl SubscriptionStore {
    /// Create a new subscription store.
    pub fn new() -> Self {
        Self {
            subscriptions: scc::HashMap::new(),
        }
    }

    /// Register `listener` under `id`.
    ///
    /// Returns `false` if an entry with the same id was replaced.
    pub fn activate(&self, id: SubscriptionId, listener: Listener) -> bool {
        let entry = SubscriptionEntry { listener };
        match self.subscriptions.insert_sync(id.clone(), entry) {
            Ok(()) => true,
            Err((id, entry)) => {
                warn!(subscription = %id, "Server reused a subscription id, replacing listener");
                let _ = self.subscriptions.update_sync(&id, |_, existing| {
                    existing.listener = entry.listener;
                });
                false
            }
        }
    }

    /// Deliver an event to the listener registered under `id`.
    ///
    /// Returns `false` if no active subscription has that id. The listener
    /// runs outside the map's bucket lock.
    pub fn dispatch(&self, id: &SubscriptionId, result: Value) -> bool {
        let Some(listener) = self
            .subscriptions
            .update_sync(id, |_, entry| Arc::clone(&entry.listener))
        else {
            return false;
        };
        listener(Ok(result));
        true
    }

    /// Remove a subscription.
    ///
    /// Returns `true` if it was present.
    pub fn remove(&self, id: &SubscriptionId) -> bool {
        self.subscriptions.remove_sync(id).is_some()
    }

    /// Check whether `id` is an active subscription.
    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.subscriptions.update_sync(id, |_, _| ()).is_some()
    }

    /// Get all active subscription ids.
    pub fn ids(&self) -> Vec<SubscriptionId> {
        let mut ids = Vec::new();
        self.subscriptions.retain_sync(|id, _| {
            ids.push(id.clone());
            true
        });
        ids
    }

    /// Get the number of active subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check if there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Clear all subscriptions.
    pub fn clear(&self) {
        self.subscriptions.clear_sync();
    }
}

impl Default for SubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion attached to a pending `eth_subscribe` request.
///
/// Settled by the connection task while it processes the response frame, so
/// the entry is active before the next inbound frame is dispatched.
pub(crate) struct ProvisionalSubscription {
    pub(crate) state: Arc<watch::Sender<SubscriptionState>>,
    pub(crate) listener: Listener,
    pub(crate) store: Arc<SubscriptionStore>,
    pub(crate) delegate: Arc<dyn ConnectionDelegate>,
}

impl ProvisionalSubscription {
    pub(crate) fn settle(self, result: TransportResult<Value>) {
        match result {
            Ok(Value::String(id)) => {
                let id = SubscriptionId::new(id);
                debug!(subscription = %id, "Subscription active");
                self.store.activate(id.clone(), self.listener);
                self.state.send_replace(SubscriptionState::Active(id));
            }
            Ok(other) => {
                self.delegate.on_error(&TransportError::processing(format!(
                    "Wrong result in subscribe response: {other}"
                )));
                self.state.send_replace(SubscriptionState::Failed);
            }
            Err(err) => {
                debug!(error = %err, "Subscription request failed");
                (self.listener)(Err(err));
                self.state.send_replace(SubscriptionState::Failed);
            }
        }
    }
}

/// Handle to a subscription created by [`WsProvider::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    state: Arc<watch::Sender<SubscriptionState>>,
    provider: WsProvider,
}

impl Subscription {
    pub(crate) fn new(state: Arc<watch::Sender<SubscriptionState>>, provider: WsProvider) -> Self {
        Self { state, provider }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        self.state.borrow().clone()
    }

    /// Server id, once assigned.
    pub fn id(&self) -> Option<SubscriptionId> {
        self.state.borrow().id().cloned()
    }

    /// Wait until the server has answered the subscribe request.
    pub async fn wait_active(&self) -> TransportResult<SubscriptionId> {
        match self.settled().await {
            SubscriptionState::Active(id) => Ok(id),
            SubscriptionState::Removed(id) => Err(TransportError::input(format!(
                "Subscription {id} was already removed"
            ))),
            SubscriptionState::Failed | SubscriptionState::Provisional => Err(
                TransportError::input("Subscription was never established"),
            ),
        }
    }

    /// Send `eth_unsubscribe` for this subscription.
    ///
    /// Waits for the server id if the subscribe response has not arrived
    /// yet. On a `true` result the entry is removed; on `false` or a
    /// malformed result a processing error is reported to the delegate,
    /// returned, and the entry stays registered. Events that arrive while
    /// the request is in flight are still delivered.
    pub async fn unsubscribe(&self) -> TransportResult<()> {
        let id = match self.settled().await {
            SubscriptionState::Active(id) => id,
            SubscriptionState::Removed(_) => return Ok(()),
            SubscriptionState::Failed | SubscriptionState::Provisional => {
                return Err(TransportError::input(
                    "Cannot unsubscribe: subscription was never established",
                ));
            }
        };

        let delegate = self.provider.delegate();
        let result = match self
            .provider
            .send_request(Method::Unsubscribe, vec![json!(id.as_str())])
            .await
        {
            Ok(result) => result,
            Err(err) => {
                delegate.on_error(&err);
                return Err(err);
            }
        };

        match result {
            Value::Bool(true) => {
                self.provider.subscriptions().remove(&id);
                self.state.send_replace(SubscriptionState::Removed(id.clone()));
                debug!(subscription = %id, "Unsubscribed");
                Ok(())
            }
            Value::Bool(false) => {
                let message = format!("Can't unsubscribe {id}");
                delegate.on_error(&TransportError::processing(message.clone()));
                Err(TransportError::processing(message))
            }
            other => {
                let message = format!("Wrong result in unsubscribe response: {other}");
                delegate.on_error(&TransportError::processing(message.clone()));
                Err(TransportError::processing(message))
            }
        }
    }

    async fn settled(&self) -> SubscriptionState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| !state.is_provisional()).await {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so it cannot be dropped here.
            Err(_) => SubscriptionState::Failed,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("state", &*self.state.borrow())
            .finish()
    }
}
