//! Receiver Demo
//!
//! Runs the viewer-side endpoint on the default port and logs what capture
//! clients send. Point a capture client at the printed URL.
//!
//! Run with: cargo run --example receiver_demo

use camlink::{init_logging, FrameReceiver, ReceiverConfig, ReceiverEvent};
use camlink_receiver::stream_url;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(None);

    let config = ReceiverConfig::default();
    let receiver = FrameReceiver::bind(config).await?;
    let port = receiver.local_addr().port();
    let handle = receiver.handle();
    let mut events = receiver.subscribe();

    info!("📡 camlink receiver listening");
    info!("🔗 Stream URL: {}", stream_url(port));
    info!("Press Ctrl+C to stop");

    let shutdown = CancellationToken::new();
    let server = receiver.spawn(shutdown.clone());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ReceiverEvent::Frame { connection_id, payload }) => {
                    tracing::debug!("Frame from {}: {} bytes", connection_id, payload.len());
                }
                Ok(other) => info!(
                    "{} {} ({} connected)",
                    other.event_name(),
                    other.connection_id(),
                    handle.client_count()
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    info!("Dropped {} events", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    shutdown.cancel();
    server.await?;
    info!("👋 Receiver stopped");
    Ok(())
}
