//! Capture Client Demo
//!
//! Streams a synthetic camera to a receiver running in the same process.
//! The receiver serves TLS with a self-signed certificate, so the client is
//! configured to accept it.
//!
//! Run with: cargo run --example capture_client_demo

use camlink::{
    init_logging, CaptureClient, ClientConfig, ClientEvent, FrameReceiver, HardwareCapability,
    Orientation, ReceiverConfig, ReceiverDestination, ReceiverEvent, SyntheticBackend,
    SyntheticConfig, TargetChange,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(Some("camlink=info,camlink_media=info,camlink_receiver=info"));

    info!("🎥 camlink Capture Client Demo");

    // Viewer side
    let receiver = FrameReceiver::bind(ReceiverConfig {
        bind_address: "127.0.0.1:0".parse()?,
        ..ReceiverConfig::default()
    })
    .await?;
    let port = receiver.local_addr().port();
    let mut frames = receiver.subscribe();
    let shutdown = CancellationToken::new();
    receiver.spawn(shutdown.clone());

    tokio::spawn(async move {
        let mut count = 0u64;
        let mut bytes = 0usize;
        while let Ok(event) = frames.recv().await {
            match event {
                ReceiverEvent::Frame { payload, .. } => {
                    count += 1;
                    bytes += payload.len();
                    if count % 30 == 0 {
                        info!("📥 Viewer received {} frames ({} KiB)", count, bytes / 1024);
                    }
                }
                other => info!("📡 Viewer: {}", other.event_name()),
            }
        }
    });

    // Capture side
    let camera = SyntheticBackend::new(SyntheticConfig {
        capability: HardwareCapability::new(1280, 720, 30),
        warmup: Duration::from_millis(800),
        ..SyntheticConfig::default()
    });
    let client = CaptureClient::builder(
        ClientConfig::for_host(format!("127.0.0.1:{}", port)),
        Arc::new(camera),
    )
    .destination(ReceiverDestination::new(port))
    .build()
    .await?;
    info!("📍 Destination: {}", client.destination());

    let mut events = client.events();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                ClientEvent::StatusChanged { status } => info!("ℹ️  {}", status),
                ClientEvent::OptionsChanged { options } => info!(
                    "⚙️  Options: fps {:?} (chosen {}), resolutions {:?} (chosen {})",
                    options.fps.values(),
                    options.chosen_fps(),
                    options.resolution.values(),
                    options.chosen_resolution()
                ),
                other => info!("🔔 {:?}", other),
            }
        }
    });

    client.boot().await?;
    client.toggle().await?;

    tokio::time::sleep(Duration::from_secs(2)).await;
    info!("🔄 Switching to portrait while streaming");
    client
        .reconfigure(TargetChange::Orientation(Orientation::Portrait))
        .await?;

    tokio::time::sleep(Duration::from_secs(2)).await;
    client.toggle().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    if let Some(stats) = client.controller().last_stats() {
        info!(
            "📊 Sent {} frames ({} bytes), skipped {} paced / {} busy / {} backpressure",
            stats.frames_sent,
            stats.bytes_sent,
            stats.skipped_paced,
            stats.skipped_busy,
            stats.skipped_backpressure
        );
    }

    client.shutdown().await;
    shutdown.cancel();
    info!("✅ Demo complete");
    Ok(())
}
