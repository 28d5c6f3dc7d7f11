//! Capture client integration tests
//!
//! The synthetic backend stands in for the camera; connection tests stream to
//! a real receiver bound on loopback.

use camlink::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

fn small_camera() -> SyntheticBackend {
    SyntheticBackend::new(SyntheticConfig {
        capability: HardwareCapability::new(640, 480, 30),
        ..SyntheticConfig::default()
    })
}

async fn client_for(config: ClientConfig, backend: &SyntheticBackend) -> CaptureClient {
    CaptureClient::builder(config, Arc::new(backend.clone()))
        .build()
        .await
        .unwrap()
}

fn drain(events: &mut EventStream) -> Vec<ClientEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.try_next() {
        out.push(event);
    }
    out
}

async fn wait_for<F>(events: &mut EventStream, mut matches: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = events.next().await.expect("client event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for client event")
}

async fn next_receiver_event(
    events: &mut broadcast::Receiver<ReceiverEvent>,
) -> ReceiverEvent {
    tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("timed out waiting for receiver event")
        .expect("receiver event channel closed")
}

async fn plain_receiver() -> (FrameReceiver, String) {
    let receiver = FrameReceiver::bind(ReceiverConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        tls: false,
        ..ReceiverConfig::default()
    })
    .await
    .unwrap();
    let host = receiver.local_addr().to_string();
    (receiver, host)
}

#[tokio::test]
async fn test_boot_selects_first_camera() {
    let backend = SyntheticBackend::default();
    let client = client_for(ClientConfig::default(), &backend).await;
    let mut events = client.events();

    client.boot().await.unwrap();

    let target = client.target().await;
    assert_eq!(target.device_id.as_deref(), Some("synthetic-0"));
    assert_eq!(target.resolution(), Resolution::FHD);
    assert_eq!(target.frame_rate, 30);
    assert!(client.is_capturing());
    assert_eq!(client.devices().await.len(), 1);

    // Permission probe plus the real capture, probe already stopped
    assert_eq!(backend.acquire_count(), 2);
    assert_eq!(backend.live_count(), 1);
    assert_eq!(backend.overlapping_acquires(), 0);

    let seen = drain(&mut events);
    assert!(seen
        .iter()
        .any(|e| matches!(e, ClientEvent::DevicesChanged { devices } if devices.len() == 1)));
    assert!(seen
        .iter()
        .any(|e| matches!(e, ClientEvent::OptionsChanged { .. })));
    assert!(seen.iter().any(|e| matches!(
        e,
        ClientEvent::StatusChanged { status } if status == "Camera Ready (Press Start)"
    )));
}

#[tokio::test]
async fn test_boot_again_refreshes_devices() {
    let backend = SyntheticBackend::new(SyntheticConfig {
        devices: vec![
            MediaDeviceInfo::video_input("front", "Front Camera"),
            MediaDeviceInfo::video_input("back", "Back Camera"),
        ],
        ..SyntheticConfig::default()
    });
    let client = client_for(ClientConfig::default(), &backend).await;

    client.boot().await.unwrap();
    assert!(client
        .reconfigure(TargetChange::Device("back".to_string()))
        .await
        .unwrap());
    client.boot().await.unwrap();

    assert_eq!(backend.overlapping_acquires(), 0);
    assert_eq!(backend.live_count(), 1);
    assert!(client.is_capturing());
    assert_eq!(client.devices().await.len(), 2);
    assert_eq!(client.target().await.device_id.as_deref(), Some("back"));
    assert!(client.negotiated().await.is_some());
}

#[tokio::test]
async fn test_boot_adapts_to_hardware_limit() {
    let backend = SyntheticBackend::new(SyntheticConfig {
        capability: HardwareCapability::new(1280, 720, 30),
        ..SyntheticConfig::default()
    });
    let mut config = ClientConfig::default();
    config.target.frame_rate = 60;
    let client = client_for(config, &backend).await;

    client.boot().await.unwrap();

    let target = client.target().await;
    assert_eq!(target.resolution(), Resolution::HD);
    assert_eq!(target.frame_rate, 30);

    let negotiated = client.negotiated().await.unwrap();
    assert_eq!(negotiated.fps.values(), vec![15, 24, 30]);
    assert_eq!(
        negotiated.resolution.values(),
        vec![Resolution::SD, Resolution::HD]
    );
    // Fallback updates the target without requesting the camera again
    assert_eq!(backend.acquire_count(), 2);
}

#[tokio::test]
async fn test_permission_denied_raises_notice() {
    let backend = SyntheticBackend::new(SyntheticConfig {
        permission_granted: false,
        ..SyntheticConfig::default()
    });
    let client = client_for(ClientConfig::default(), &backend).await;
    let mut events = client.events();

    let err = client.boot().await.unwrap_err();
    assert_eq!(err.error_code(), "CAPTURE_ERROR");
    assert!(!client.is_capturing());
    assert!(client.devices().await.is_empty());

    let seen = drain(&mut events);
    assert!(seen
        .iter()
        .any(|e| matches!(e, ClientEvent::DevicesChanged { devices } if devices.is_empty())));
    assert!(seen.iter().any(ClientEvent::is_notice));
    assert!(seen.iter().any(|e| matches!(
        e,
        ClientEvent::StatusChanged { status } if status.starts_with("Error: ")
    )));
}

#[tokio::test]
async fn test_reconfigure_keeps_one_live_capture() {
    let backend = SyntheticBackend::default();
    let client = client_for(ClientConfig::default(), &backend).await;
    client.boot().await.unwrap();
    let acquired = backend.acquire_count();

    // Unchanged target is a no-op
    assert!(!client
        .reconfigure(TargetChange::FrameRate(30))
        .await
        .unwrap());
    assert_eq!(backend.acquire_count(), acquired);

    assert!(client
        .reconfigure(TargetChange::Orientation(Orientation::Portrait))
        .await
        .unwrap());
    assert!(client
        .reconfigure(TargetChange::Resolution(Resolution::HD))
        .await
        .unwrap());
    assert!(client
        .reconfigure(TargetChange::FrameRate(60))
        .await
        .unwrap());

    assert_eq!(backend.acquire_count(), acquired + 3);
    assert_eq!(backend.live_count(), 1);
    assert_eq!(backend.overlapping_acquires(), 0);
    assert!(backend.stop_count() >= backend.acquire_count() - 1);

    let constraints = backend.last_constraints().unwrap();
    assert_eq!(constraints.width.unwrap().ideal, 720);
    assert_eq!(constraints.height.unwrap().ideal, 1280);
    assert_eq!(constraints.frame_rate.unwrap().max, 60);
    assert_eq!(client.target().await.frame_rate, 60);
}

#[tokio::test]
async fn test_reconfigure_before_boot_only_updates_target() {
    let backend = SyntheticBackend::default();
    let client = client_for(ClientConfig::default(), &backend).await;

    assert!(client
        .reconfigure(TargetChange::Device("synthetic-0".to_string()))
        .await
        .unwrap());
    assert_eq!(backend.acquire_count(), 0);
    assert!(client.reconfigure(TargetChange::FrameRate(0)).await.is_err());
    assert_eq!(client.target().await.frame_rate, 30);
}

#[tokio::test]
async fn test_unknown_device_is_recoverable() {
    let backend = SyntheticBackend::default();
    let client = client_for(ClientConfig::default(), &backend).await;
    client.boot().await.unwrap();

    let err = client
        .reconfigure(TargetChange::Device("missing".to_string()))
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
    assert!(!client.is_capturing());

    client
        .reconfigure(TargetChange::Device("synthetic-0".to_string()))
        .await
        .unwrap();
    assert!(client.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_orientation_burst_reacquires_once() {
    let backend = SyntheticBackend::default();
    let client = client_for(ClientConfig::default(), &backend).await;
    client.boot().await.unwrap();
    let acquired = backend.acquire_count();

    for _ in 0..5 {
        client.orientation_changed();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(backend.acquire_count(), acquired);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(backend.acquire_count(), acquired + 1);
    assert_eq!(backend.live_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_orientation_ignored_without_capture() {
    let backend = SyntheticBackend::default();
    let client = client_for(ClientConfig::default(), &backend).await;

    client.orientation_changed();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.acquire_count(), 0);
}

#[tokio::test]
async fn test_destination_resolved_once() {
    let backend = SyntheticBackend::default();
    let client = CaptureClient::builder(ClientConfig::default(), Arc::new(backend))
        .destination(StaticDestination::new("https://10.0.0.5:4104"))
        .build()
        .await
        .unwrap();
    assert_eq!(client.destination(), "https://10.0.0.5:4104");

    let client = client_for(ClientConfig::default(), &SyntheticBackend::default()).await;
    assert_eq!(client.destination(), FALLBACK_DESTINATION);
}

#[tokio::test]
async fn test_streams_frames_to_receiver() {
    let (receiver, host) = plain_receiver().await;
    let handle = receiver.handle();
    let mut frames = receiver.subscribe();
    let shutdown = CancellationToken::new();
    receiver.spawn(shutdown.clone());

    let backend = small_camera();
    let mut config = ClientConfig::for_host(host);
    config.secure = false;
    let client = client_for(config, &backend).await;
    let mut events = client.events();
    client.boot().await.unwrap();

    assert_eq!(client.toggle().await.unwrap(), ConnectionState::Open);
    wait_for(&mut events, |e| matches!(e, ClientEvent::Connected { .. })).await;
    assert_eq!(
        next_receiver_event(&mut frames).await.event_name(),
        "client-connected"
    );

    for _ in 0..3 {
        match next_receiver_event(&mut frames).await {
            ReceiverEvent::Frame { payload, .. } => {
                let jpeg = camlink_media::decode_data_url(&payload).unwrap();
                assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
            }
            other => panic!("unexpected receiver event {:?}", other),
        }
    }

    assert_eq!(client.toggle().await.unwrap(), ConnectionState::Closed);
    wait_for(&mut events, |e| matches!(e, ClientEvent::Disconnected { .. })).await;

    // Frames already queued may still arrive; nothing follows the disconnect
    loop {
        let event = next_receiver_event(&mut frames).await;
        if event.event_name() == "client-disconnected" {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(matches!(
        frames.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
    assert_eq!(handle.client_count(), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = client.controller().last_stats().unwrap();
    assert!(stats.frames_sent >= 3);
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, ClientEvent::Disconnected { .. })));

    client.shutdown().await;
    shutdown.cancel();
}

#[tokio::test]
async fn test_peer_close_disconnects_once() {
    let (receiver, host) = plain_receiver().await;
    let shutdown = CancellationToken::new();
    receiver.spawn(shutdown.clone());

    let backend = small_camera();
    let mut config = ClientConfig::for_host(host);
    config.secure = false;
    let client = client_for(config, &backend).await;
    let mut events = client.events();
    client.boot().await.unwrap();
    client.toggle().await.unwrap();

    shutdown.cancel();
    let event = wait_for(&mut events, |e| matches!(e, ClientEvent::Disconnected { .. })).await;
    assert!(matches!(event, ClientEvent::Disconnected { .. }));
    assert_eq!(client.connection_state(), ConnectionState::Closed);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, ClientEvent::Disconnected { .. })));
    client.shutdown().await;
}

#[tokio::test]
async fn test_failed_connect_allows_retry() {
    // Bind and drop to find a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let backend = small_camera();
    let mut config = ClientConfig::for_host(format!("127.0.0.1:{}", port));
    config.secure = false;
    config.connect_timeout = Duration::from_secs(2);
    let client = client_for(config, &backend).await;
    let mut events = client.events();
    client.boot().await.unwrap();

    let err = client.toggle().await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(client.connection_state(), ConnectionState::Closed);

    let seen = drain(&mut events);
    assert_eq!(
        seen.iter()
            .filter(|e| matches!(e, ClientEvent::Disconnected { .. }))
            .count(),
        1
    );
    assert!(seen.iter().any(|e| matches!(
        e,
        ClientEvent::StatusChanged { status } if status == "Connection error"
    )));

    // Closed behaves like Idle: the next toggle dials again
    assert!(client.toggle().await.is_err());
    client.shutdown().await;
}
