//! Subscription filters and their `eth_subscribe` parameters.

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::TransportResult;

/// Log filter object sent with a `logs` subscription.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_block: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<String>,
    /// Topic positions; `None` matches anything at that position.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<Option<Vec<String>>>,
}

impl LogFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to logs emitted by `address`.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address.push(address.into());
        self
    }

    /// Append a topic position.
    #[must_use]
    pub fn topic(mut self, topic: Option<Vec<String>>) -> Self {
        self.topics.push(topic);
        self
    }

    /// Set the first block of the range.
    #[must_use]
    pub fn from_block(mut self, block: impl Into<String>) -> Self {
        self.from_block = Some(block.into());
        self
    }

    /// Set the last block of the range.
    #[must_use]
    pub fn to_block(mut self, block: impl Into<String>) -> Self {
        self.to_block = Some(block.into());
        self
    }
}

/// Event stream a subscription listens to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscribeEventFilter {
    /// New block headers.
    NewHeads,
    /// Logs matching a filter.
    Logs(LogFilter),
    /// Hashes of transactions entering the pending pool.
    NewPendingTransactions,
    /// Sync status changes.
    Syncing,
}

impl SubscribeEventFilter {
    /// Name of the stream on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewHeads => "newHeads",
            Self::Logs(_) => "logs",
            Self::NewPendingTransactions => "newPendingTransactions",
            Self::Syncing => "syncing",
        }
    }

    /// Build the `eth_subscribe` params array.
    pub fn to_params(&self) -> TransportResult<Vec<Value>> {
        let mut params = vec![json!(self.kind())];
        if let Self::Logs(filter) = self {
            params.push(serde_json::to_value(filter)?);
        }
        Ok(params)
    }
}
