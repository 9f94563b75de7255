mod common;

use std::time::Duration;

use common::{WAIT, connected_provider, id_of, idle_provider, test_config};
use hpx_web3_ws::{
    ConnectionState, ErrorCategory, Method, SubscribeEventFilter, TransportError, TransportEvent,
    WsMessage,
};
use serde_json::json;
use tokio::time::timeout;

#[tokio::test]
async fn test_peer_close_fails_every_pending_request_once() {
    let (provider, mut server, delegate) = connected_provider(test_config()).await;

    let mut requests = Vec::new();
    for filter in ["newHeads", "syncing", "newPendingTransactions"] {
        let provider = provider.clone();
        requests.push(tokio::spawn(async move {
            provider
                .send_request(Method::Subscribe, vec![json!(filter)])
                .await
        }));
        server.next_json().await;
    }
    assert_eq!(provider.pending_count(), 3);

    server
        .inject(TransportEvent::Disconnected {
            reason: "going away".to_string(),
            code: 1001,
        })
        .await;

    for request in requests {
        let err = timeout(WAIT, request).await.unwrap().unwrap().unwrap_err();
        assert!(err.is_connection_lost(), "unexpected error {err:?}");
    }
    assert_eq!(provider.pending_count(), 0);
    assert_eq!(provider.state(), ConnectionState::Disconnected);

    let errors = delegate.wait_for_errors(1).await;
    let lost: Vec<_> = errors
        .iter()
        .filter(|(category, _)| *category == ErrorCategory::Connection)
        .collect();
    assert_eq!(lost.len(), 1);
    assert!(lost[0].1.contains("going away"));
}

#[tokio::test]
async fn test_explicit_disconnect_fails_pending_requests() {
    let (provider, mut server, _) = connected_provider(test_config()).await;

    let request = tokio::spawn({
        let provider = provider.clone();
        async move {
            provider
                .send_request(Method::Unsubscribe, vec![json!("0x1")])
                .await
        }
    });
    server.next_json().await;

    provider.disconnect().await.unwrap();
    assert_eq!(provider.state(), ConnectionState::Disconnected);

    let err = timeout(WAIT, request).await.unwrap().unwrap().unwrap_err();
    assert!(matches!(err, TransportError::ConnectionLost { .. }));
}

#[tokio::test]
async fn test_disconnect_before_connect_fails_buffered_requests() {
    let (provider, mut server, delegate) = idle_provider(test_config());

    let request = tokio::spawn({
        let provider = provider.clone();
        async move {
            provider
                .send_request(Method::Subscribe, vec![json!("newHeads")])
                .await
        }
    });
    timeout(WAIT, async {
        while provider.pending_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    provider.disconnect().await.unwrap();

    let err = timeout(WAIT, request).await.unwrap().unwrap().unwrap_err();
    assert!(err.is_connection_lost(), "unexpected error {err:?}");
    assert_eq!(provider.pending_count(), 0);
    assert_eq!(provider.state(), ConnectionState::Disconnected);
    assert_eq!(server.connect_count(), 0);

    // The dropped frame is not replayed on a later connect.
    provider.connect().await.unwrap();
    server.accept().await;
    timeout(WAIT, provider.wait_connected()).await.unwrap().unwrap();
    server.assert_idle().await;
    assert!(delegate.errors().is_empty());
}

#[tokio::test]
async fn test_transport_error_moves_to_errored_and_allows_reconnect() {
    let (provider, mut server, delegate) = connected_provider(test_config()).await;

    server
        .inject(TransportEvent::Error(TransportError::websocket("reset by peer")))
        .await;
    let mut state = provider.watch_state();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Errored))
        .await
        .unwrap()
        .unwrap();

    let errors = delegate.wait_for_errors(2).await;
    assert!(errors[0].1.contains("reset by peer"));
    assert!(errors[1].1.contains("Connection lost"));

    provider.connect().await.unwrap();
    assert_eq!(server.connect_count(), 2);
    server.accept().await;
    timeout(WAIT, provider.wait_connected()).await.unwrap().unwrap();

    provider.write_message(WsMessage::text("after")).await.unwrap();
    assert_eq!(server.next_frame().await, WsMessage::text("after"));
}

#[tokio::test]
async fn test_subscriptions_are_not_replayed_on_reconnect() {
    let (provider, mut server, _) = connected_provider(test_config()).await;

    let subscription = provider
        .subscribe(SubscribeEventFilter::NewHeads, |_| {})
        .await
        .unwrap();
    let frame = server.next_json().await;
    server
        .push_json(json!({"id": id_of(&frame), "result": "0xabc"}))
        .await;
    subscription.wait_active().await.unwrap();

    server.inject(TransportEvent::Cancelled).await;
    let mut state = provider.watch_state();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();

    provider.connect().await.unwrap();
    server.accept().await;
    timeout(WAIT, provider.wait_connected()).await.unwrap().unwrap();

    server.assert_idle().await;
    assert_eq!(provider.subscription_count(), 1);
}

#[tokio::test]
async fn test_connect_is_noop_while_connected() {
    let (provider, server, _) = connected_provider(test_config()).await;

    provider.connect().await.unwrap();
    assert_eq!(server.connect_count(), 1);
    assert!(provider.is_connected());
}
