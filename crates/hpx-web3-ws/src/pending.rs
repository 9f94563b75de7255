//! Lock-free pending request management using `scc::HashMap`.
//!
//! This store allocates correlation ids and tracks outgoing requests awaiting
//! their response. Every entry is completed exactly once: by its response,
//! by a timeout sweep, or by [`PendingRequestStore::fail_all`] when the
//! connection goes away.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::{
    config::WsConfig,
    error::{TransportError, TransportResult},
    subscription::ProvisionalSubscription,
    types::RequestId,
};

/// Receiver side of a correlated call.
pub type ResponseReceiver = oneshot::Receiver<TransportResult<Value>>;

/// What to do with the response of a pending request.
pub(crate) enum Completion {
    /// Hand the result to the awaiting caller.
    Call(oneshot::Sender<TransportResult<Value>>),
    /// Promote or fail a provisional subscription.
    Subscribe(ProvisionalSubscription),
}

impl Completion {
    fn complete(self, result: TransportResult<Value>) {
        match self {
            // Receiver may have been dropped by a cancelled caller.
            Self::Call(tx) => {
                let _ = tx.send(result);
            }
            Self::Subscribe(provisional) => provisional.settle(result),
        }
    }
}

/// A pending request awaiting a response.
pub(crate) struct PendingRequest {
    completion: Completion,
    /// When this request was created.
    created_at: Instant,
    /// Optional expiry; `None` waits until disconnect.
    timeout: Option<Duration>,
}

impl PendingRequest {
    fn is_expired(&self, now: Instant) -> bool {
        self.timeout
            .is_some_and(|timeout| now.duration_since(self.created_at) >= timeout)
    }
}

/// Lock-free store for pending requests.
///
/// Uses `scc::HashMap` so that callers registering requests and the
/// connection task resolving them never contend on a single lock.
pub struct PendingRequestStore {
    requests: scc::HashMap<RequestId, PendingRequest>,
    next_id: AtomicU64,
    config: Arc<WsConfig>,
}

impl PendingRequestStore {
    /// Create a new pending request store. Ids start at 1.
    pub fn new(config: Arc<WsConfig>) -> Self {
        Self {
            requests: scc::HashMap::new(),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    /// Allocate the next correlation id.
    pub fn next_id(&self) -> RequestId {
        RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a new call and return its id and response receiver.
    pub fn add(&self) -> TransportResult<(RequestId, ResponseReceiver)> {
        let (tx, rx) = oneshot::channel();
        let id = self.insert(Completion::Call(tx))?;
        Ok((id, rx))
    }

    pub(crate) fn add_subscription(
        &self,
        provisional: ProvisionalSubscription,
    ) -> TransportResult<RequestId> {
        self.insert(Completion::Subscribe(provisional))
    }

    fn insert(&self, completion: Completion) -> TransportResult<RequestId> {
        if !self.has_capacity() {
            return Err(TransportError::input("Too many pending requests"));
        }

        let id = self.next_id();
        let pending = PendingRequest {
            completion,
            created_at: Instant::now(),
            timeout: self.config.request_timeout,
        };

        // Insert returns Err if key already exists
        if self.requests.insert_sync(id, pending).is_err() {
            return Err(TransportError::internal(format!(
                "Request id {id} is already pending"
            )));
        }

        Ok(id)
    }

    /// Resolve a pending request with a response.
    ///
    /// Returns `true` if the request was found and resolved, `false` otherwise.
    pub fn resolve(&self, id: &RequestId, result: TransportResult<Value>) -> bool {
        if let Some((_, pending)) = self.requests.remove_sync(id) {
            pending.completion.complete(result);
            return true;
        }
        false
    }

    /// Remove a pending request without notifying the receiver.
    ///
    /// Returns `true` if the request was present, `false` otherwise.
    pub fn remove(&self, id: &RequestId) -> bool {
        self.requests.remove_sync(id).is_some()
    }

    /// Check whether `id` is still awaiting a response.
    pub fn contains(&self, id: &RequestId) -> bool {
        self.requests.update_sync(id, |_, _| ()).is_some()
    }

    /// Fail every expired request with a timeout error.
    ///
    /// Returns the number of expired requests.
    pub fn expire_stale(&self) -> usize {
        let now = Instant::now();
        let mut expired = Vec::new();

        // First, collect expired IDs
        self.requests.retain_sync(|id, pending| {
            if pending.is_expired(now) {
                expired.push(*id);
            }
            true
        });

        // Then remove and notify each one
        let mut count = 0;
        for id in expired {
            if let Some((_, pending)) = self.requests.remove_sync(&id) {
                let timeout = pending.timeout.unwrap_or_default();
                pending.completion.complete(Err(TransportError::timeout(timeout)));
                count += 1;
            }
        }
        count
    }

    /// Fail all pending requests with a connection lost error.
    ///
    /// Returns the number of failed requests.
    pub fn fail_all(&self, reason: &str) -> usize {
        let mut ids = Vec::new();
        self.requests.retain_sync(|id, _| {
            ids.push(*id);
            true
        });

        let mut count = 0;
        for id in ids {
            if let Some((_, pending)) = self.requests.remove_sync(&id) {
                pending
                    .completion
                    .complete(Err(TransportError::connection_lost(reason)));
                count += 1;
            }
        }
        count
    }

    /// Check if there's capacity for more requests.
    pub fn has_capacity(&self) -> bool {
        self.requests.len() < self.config.max_pending_requests
    }

    /// Get the current number of pending requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
