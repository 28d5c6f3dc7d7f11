//! Integration tests for the frame receiver
//!
//! Each test binds a receiver on an ephemeral loopback port and drives it with
//! a real WebSocket client.

use camlink_core::{FrameLink, LinkConfig, TlsMode, WebSocketLink};
use camlink_receiver::*;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

fn loopback_config(tls: bool) -> ReceiverConfig {
    ReceiverConfig {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        tls,
        ..ReceiverConfig::default()
    }
}

async fn next_event(events: &mut broadcast::Receiver<ReceiverEvent>) -> ReceiverEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for receiver event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_plain_client_lifecycle() {
    let receiver = FrameReceiver::bind(loopback_config(false)).await.unwrap();
    let addr = receiver.local_addr();
    let handle = receiver.handle();
    let mut events = receiver.subscribe();
    let shutdown = CancellationToken::new();
    receiver.spawn(shutdown.clone());

    let (mut socket, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    let connected = next_event(&mut events).await;
    assert_eq!(connected.event_name(), "client-connected");
    assert_eq!(handle.client_count(), 1);

    socket
        .send(Message::Text("data:image/jpeg;base64,AAAA".to_string()))
        .await
        .unwrap();
    socket.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    socket
        .send(Message::Text("data:image/jpeg;base64,BBBB".to_string()))
        .await
        .unwrap();

    for expected in ["data:image/jpeg;base64,AAAA", "data:image/jpeg;base64,BBBB"] {
        match next_event(&mut events).await {
            ReceiverEvent::Frame {
                connection_id,
                payload,
            } => {
                assert_eq!(connection_id, connected.connection_id());
                assert_eq!(payload, expected);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    socket.close(None).await.unwrap();
    let disconnected = next_event(&mut events).await;
    assert_eq!(disconnected.event_name(), "client-disconnected");
    assert_eq!(disconnected.connection_id(), connected.connection_id());
    assert_eq!(handle.client_count(), 0);

    shutdown.cancel();
}

#[tokio::test]
async fn test_rejects_other_paths() {
    let receiver = FrameReceiver::bind(loopback_config(false)).await.unwrap();
    let addr = receiver.local_addr();
    let handle = receiver.handle();
    let shutdown = CancellationToken::new();
    receiver.spawn(shutdown.clone());

    let result = connect_async(format!("ws://{}/other", addr)).await;
    assert!(result.is_err());
    assert_eq!(handle.client_count(), 0);

    shutdown.cancel();
}

#[tokio::test]
async fn test_tls_link_streams_frames() {
    let receiver = FrameReceiver::bind(loopback_config(true)).await.unwrap();
    let addr = receiver.local_addr();
    let mut events = receiver.subscribe();
    let shutdown = CancellationToken::new();
    receiver.spawn(shutdown.clone());

    let config = LinkConfig {
        tls: TlsMode::AcceptInvalidCerts,
        ..LinkConfig::default()
    };
    let (link, monitor) = WebSocketLink::connect(&format!("wss://{}/ws", addr), &config)
        .await
        .unwrap();
    assert!(link.is_open());
    assert_eq!(next_event(&mut events).await.event_name(), "client-connected");

    link.send_text("data:image/jpeg;base64,/9j/".to_string())
        .unwrap();
    match next_event(&mut events).await {
        ReceiverEvent::Frame { payload, .. } => assert_eq!(payload, "data:image/jpeg;base64,/9j/"),
        other => panic!("unexpected event {:?}", other),
    }

    link.close();
    assert_eq!(
        next_event(&mut events).await.event_name(),
        "client-disconnected"
    );
    assert_eq!(monitor.closed().await, camlink_core::CloseReason::Local);

    shutdown.cancel();
}

#[tokio::test]
async fn test_tls_rejects_strict_client() {
    let receiver = FrameReceiver::bind(loopback_config(true)).await.unwrap();
    let addr = receiver.local_addr();
    let shutdown = CancellationToken::new();
    receiver.spawn(shutdown.clone());

    let config = LinkConfig {
        tls: TlsMode::Verified,
        ..LinkConfig::default()
    };
    let result = WebSocketLink::connect(&format!("wss://{}/ws", addr), &config).await;
    let err = result.unwrap_err();
    assert!(err.is_transport());

    shutdown.cancel();
}

#[tokio::test]
async fn test_bind_conflict_reports_address() {
    let first = FrameReceiver::bind(loopback_config(false)).await.unwrap();
    let taken = first.local_addr();

    let err = FrameReceiver::bind(ReceiverConfig {
        bind_address: taken,
        tls: false,
        ..ReceiverConfig::default()
    })
    .await
    .unwrap_err();
    assert_eq!(err.error_code(), "SERVER_START_FAILED");
}
