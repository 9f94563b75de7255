//! # hpx-web3-ws
//!
//! WebSocket JSON-RPC provider for Ethereum style nodes.
//!
//! One long-lived WebSocket connection is turned into a multiplexed channel:
//!
//! - **Correlated requests**: every request carries a numeric id and its
//!   future resolves exactly once with the matching response
//! - **Subscriptions**: `eth_subscribe` streams are routed to listeners by
//!   their server-assigned id
//! - **Buffered writes**: frames queued before the socket is open are sent
//!   in order as soon as it connects
//!
//! The socket itself sits behind [`TransportAdapter`]; the default
//! [`TungsteniteTransport`] uses `tokio-tungstenite`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hpx_web3_ws::{SubscribeEventFilter, TracingDelegate, WsConfig, WsProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WsConfig::new("wss://mainnet.example.org/ws");
//!     let provider = WsProvider::connect_to(config, TracingDelegate).await?;
//!
//!     let (subscription, mut heads) = provider
//!         .subscribe_channel(SubscribeEventFilter::NewHeads)
//!         .await?;
//!
//!     if let Some(head) = heads.recv().await {
//!         println!("{:?}", head?);
//!     }
//!
//!     subscription.unsubscribe().await?;
//!     Ok(())
//! }
//! ```

mod actor;
pub mod config;
pub mod delegate;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod outbound;
pub mod pending;
pub mod protocol;
pub mod provider;
pub mod subscription;
pub mod transport;
pub mod types;
pub mod ws_transport;

// Re-export commonly used types
pub use config::WsConfig;
pub use delegate::{ConnectionDelegate, Headers, NoopDelegate, TracingDelegate};
pub use dispatcher::{DispatchOutcome, Dispatcher, InboundFrame, classify_frame};
pub use error::{ErrorCategory, TransportError, TransportResult};
pub use filter::{LogFilter, SubscribeEventFilter};
pub use outbound::{Outbound, Outbox};
pub use pending::{PendingRequestStore, ResponseReceiver};
pub use protocol::{
    Method, RpcRequest, RpcResponse, SubscriptionEvent, SubscriptionParams, WsMessage,
};
pub use provider::{EventReceiver, WsProvider};
pub use subscription::{Listener, Subscription, SubscriptionState, SubscriptionStore};
pub use transport::{TransportAdapter, TransportEvent};
pub use types::{ConnectionState, RequestId, SubscriptionId};
pub use ws_transport::TungsteniteTransport;
