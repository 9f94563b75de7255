//! Inbound frame classification and routing.
//!
//! Every text frame is classified in this order:
//!
//! 1. an object with a numeric `id` is a response and resolves the matching
//!    pending request;
//! 2. an object whose `params` carry `subscription` and `result` is a
//!    subscription event and goes to the registry;
//! 3. any other object with a `result` is a server-initiated message the
//!    provider does not route (reported as unhandled);
//! 4. everything else is a processing error.
//!
//! Nothing in here closes the connection: a bad frame is reported to the
//! delegate and the next frame is processed normally.

use std::sync::Arc;

use serde_json::Value;
use tracing::{trace, warn};

use crate::{
    delegate::ConnectionDelegate,
    error::TransportError,
    pending::PendingRequestStore,
    protocol::{RpcResponse, SubscriptionEvent},
    subscription::SubscriptionStore,
    types::{RequestId, SubscriptionId},
};

/// Classified inbound frame.
#[derive(Debug)]
pub enum InboundFrame {
    /// Response to a correlated request.
    Response(RpcResponse),
    /// Event for a subscription.
    Event(SubscriptionEvent),
    /// Server-initiated message without a routing target.
    Unhandled(Value),
}

/// Classify a text frame.
pub fn classify_frame(text: &str) -> Result<InboundFrame, TransportError> {
    let unknown =
        || TransportError::processing(format!("Can't get known result. Message is: {text}"));

    let Ok(json) = serde_json::from_str::<Value>(text) else {
        return Err(unknown());
    };
    let Value::Object(map) = &json else {
        return Err(unknown());
    };

    if map.get("id").and_then(Value::as_u64).is_some() {
        let response: RpcResponse = serde_json::from_value(json)?;
        return Ok(InboundFrame::Response(response));
    }

    if let Some(params) = map.get("params")
        && params.get("subscription").is_some_and(Value::is_string)
        && params.get("result").is_some()
    {
        let event: SubscriptionEvent = serde_json::from_value(json)?;
        return Ok(InboundFrame::Event(event));
    }

    if map.contains_key("result") {
        return Ok(InboundFrame::Unhandled(json));
    }

    Err(unknown())
}

/// What happened to a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A pending request was completed.
    Resolved(RequestId),
    /// A subscription listener received the event.
    Delivered(SubscriptionId),
    /// Recognised but not routed anywhere.
    Unhandled,
    /// Reported to the delegate as an error.
    Rejected,
}

/// Routes inbound frames to the correlator or the subscription registry.
pub struct Dispatcher {
    pending: Arc<PendingRequestStore>,
    subscriptions: Arc<SubscriptionStore>,
    delegate: Arc<dyn ConnectionDelegate>,
}

impl Dispatcher {
    /// Create a dispatcher over shared stores.
    pub fn new(
        pending: Arc<PendingRequestStore>,
        subscriptions: Arc<SubscriptionStore>,
        delegate: Arc<dyn ConnectionDelegate>,
    ) -> Self {
        Self {
            pending,
            subscriptions,
            delegate,
        }
    }

    /// Handle one inbound text frame.
    pub fn on_text(&self, text: &str) -> DispatchOutcome {
        trace!(frame = %text, "Inbound frame");

        match classify_frame(text) {
            Ok(InboundFrame::Response(response)) => {
                let id = response.id;
                if self.pending.resolve(&id, response.into_result()) {
                    DispatchOutcome::Resolved(id)
                } else {
                    self.reject(TransportError::processing(format!(
                        "Unknown response id. Message is: {text}"
                    )))
                }
            }
            Ok(InboundFrame::Event(event)) => {
                let id = event.params.subscription;
                if self.subscriptions.dispatch(&id, event.params.result) {
                    DispatchOutcome::Delivered(id)
                } else {
                    self.reject(TransportError::processing(format!(
                        "Unknown subscription id {id}"
                    )))
                }
            }
            Ok(InboundFrame::Unhandled(_)) => {
                self.delegate.on_error(&TransportError::UnhandledMessage {
                    raw: text.to_string(),
                });
                DispatchOutcome::Unhandled
            }
            Err(err) => self.reject(err),
        }
    }

    /// Handle one inbound binary frame. The protocol is text only.
    pub fn on_binary(&self, data: &[u8]) -> DispatchOutcome {
        self.reject(TransportError::UnsupportedDataType { len: data.len() })
    }

    fn reject(&self, err: TransportError) -> DispatchOutcome {
        warn!(error = %err, "Dropping inbound frame");
        self.delegate.on_error(&err);
        DispatchOutcome::Rejected
    }
}
