mod common;

use std::sync::Arc;

use common::{RecordingDelegate, WAIT, init_tracing};
use futures_util::{SinkExt, StreamExt};
use hpx_web3_ws::{ConnectionState, SubscribeEventFilter, WsConfig, WsProvider};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::mpsc, time::timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Minimal node: answers `eth_subscribe` with `0xabc`, pushes one head and
/// confirms `eth_unsubscribe`. Every request it sees is forwarded to the test.
async fn start_node() -> std::io::Result<(String, mpsc::UnboundedReceiver<Value>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };

        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let Ok(request) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            let _ = seen_tx.send(request.clone());

            let id = request["id"].clone();
            match request["method"].as_str() {
                Some("eth_subscribe") => {
                    let reply = json!({"jsonrpc": "2.0", "id": id, "result": "0xabc"});
                    let event = json!({
                        "jsonrpc": "2.0",
                        "method": "eth_subscription",
                        "params": {"subscription": "0xabc", "result": {"number": "0x10"}}
                    });
                    if ws.send(Message::text(reply.to_string())).await.is_err()
                        || ws.send(Message::text(event.to_string())).await.is_err()
                    {
                        return;
                    }
                }
                Some("eth_unsubscribe") => {
                    let reply = json!({"jsonrpc": "2.0", "id": id, "result": true});
                    if ws.send(Message::text(reply.to_string())).await.is_err() {
                        return;
                    }
                }
                _ => {}
            }
        }
    });

    Ok((format!("ws://{addr}"), seen_rx))
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe_over_real_socket() {
    init_tracing();
    let (url, mut seen) = start_node().await.unwrap();
    let delegate = Arc::new(RecordingDelegate::default());

    let provider = WsProvider::connect_to(WsConfig::new(url), Arc::clone(&delegate))
        .await
        .unwrap();
    let (subscription, mut heads) = provider
        .subscribe_channel(SubscribeEventFilter::NewHeads)
        .await
        .unwrap();

    timeout(WAIT, provider.wait_connected()).await.unwrap().unwrap();
    assert_eq!(provider.state(), ConnectionState::Connected);

    let head = timeout(WAIT, heads.recv()).await.unwrap().unwrap().unwrap();
    assert_eq!(head, json!({"number": "0x10"}));

    let request = timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(request["jsonrpc"], "2.0");
    assert_eq!(request["params"], json!(["newHeads"]));

    timeout(WAIT, subscription.unsubscribe()).await.unwrap().unwrap();
    let request = timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(request["method"], "eth_unsubscribe");
    assert_eq!(request["params"], json!(["0xabc"]));
    assert_eq!(provider.subscription_count(), 0);

    assert_eq!(delegate.connected.lock().unwrap().len(), 1);
    assert!(delegate.errors().is_empty());

    provider.disconnect().await.unwrap();
    assert_eq!(provider.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unreachable_endpoint_ends_errored() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let delegate = Arc::new(RecordingDelegate::default());
    let provider = WsProvider::connect_to(
        WsConfig::new(format!("ws://{addr}")),
        Arc::clone(&delegate),
    )
    .await
    .unwrap();

    assert!(timeout(WAIT, provider.wait_connected()).await.unwrap().is_err());
    assert_eq!(provider.state(), ConnectionState::Errored);
    assert_eq!(delegate.wait_for_errors(1).await.len(), 1);
}
