//! New Heads Example
//!
//! Subscribes to `newHeads` on a node and logs the first few blocks.
//!
//! Run with: `cargo run -p hpx-web3-ws --example new_heads -- wss://node.example.org/ws`

use std::time::Duration;

use hpx_web3_ws::{SubscribeEventFilter, TracingDelegate, WsConfig, WsProvider};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const HEADS: usize = 3;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:8546".to_string());
    let config = WsConfig::new(url).connect_timeout(Duration::from_secs(5));

    let provider = WsProvider::connect_to(config, TracingDelegate).await?;
    provider.wait_connected().await?;

    let (subscription, mut heads) = provider
        .subscribe_channel(SubscribeEventFilter::NewHeads)
        .await?;
    let id = subscription.wait_active().await?;
    info!(subscription = %id, "Subscribed to new heads");

    for _ in 0..HEADS {
        match heads.recv().await {
            Some(Ok(head)) => info!(number = %head["number"], hash = %head["hash"], "New head"),
            Some(Err(err)) => warn!(error = %err, "Subscription failed"),
            None => break,
        }
    }

    subscription.unsubscribe().await?;
    provider.disconnect().await?;
    Ok(())
}
