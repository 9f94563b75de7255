//! JSON-RPC wire messages.
//!
//! Requests follow `{"jsonrpc":"2.0","id":N,"method":M,"params":[...]}`.
//! Responses carry the same numeric id plus either `result` or `error`;
//! subscription events carry `params.subscription` and `params.result`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{TransportError, TransportResult},
    types::{RequestId, SubscriptionId},
};

/// Message representation for WebSocket communication.
///
/// The variant is chosen at the call site; payloads are never inspected to
/// guess their type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsMessage {
    /// Text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Create a text message.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Create a binary message.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(data.into())
    }

    /// Encode a serializable value as a JSON text message.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> TransportResult<Self> {
        Ok(Self::Text(serde_json::to_string(value)?))
    }

    /// Get as text if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    /// Get as bytes regardless of message type.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// JSON-RPC method names known to the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Method {
    /// `eth_subscribe`
    Subscribe,
    /// `eth_unsubscribe`
    Unsubscribe,
    /// Any other method.
    Other(String),
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Subscribe => "eth_subscribe",
            Self::Unsubscribe => "eth_unsubscribe",
            Self::Other(name) => name,
        }
    }

    /// Whether the method may be sent over a streaming connection.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Subscribe | Self::Unsubscribe)
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        match name {
            "eth_subscribe" => Self::Subscribe,
            "eth_unsubscribe" => Self::Unsubscribe,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound JSON-RPC request.
#[derive(Clone, Debug, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Build a request for `method`.
    pub fn new(id: RequestId, method: &Method, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.as_str().to_string(),
            params,
        }
    }

    /// Encode as a text frame.
    pub fn to_message(&self) -> TransportResult<WsMessage> {
        WsMessage::json(self)
    }
}

/// Inbound JSON-RPC response.
#[derive(Clone, Debug, Deserialize)]
pub struct RpcResponse {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl RpcResponse {
    /// Convert into the outcome delivered to the caller.
    ///
    /// A present `error` member wins over `result`; a missing result is
    /// `null`.
    pub fn into_result(self) -> TransportResult<Value> {
        match self.error {
            Some(error) if !error.is_null() => Err(TransportError::node(error)),
            _ => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Inbound subscription event.
#[derive(Clone, Debug, Deserialize)]
pub struct SubscriptionEvent {
    pub params: SubscriptionParams,
}

/// `params` member of a subscription event.
#[derive(Clone, Debug, Deserialize)]
pub struct SubscriptionParams {
    pub subscription: SubscriptionId,
    pub result: Value,
}
