//! # camlink - camera capture client
//!
//! camlink turns a camera into a live feed pushed to a viewer over one
//! WebSocket. It finds the cameras, negotiates what the hardware can really
//! deliver against what was asked for, keeps exactly one capture live, and
//! streams JPEG frames paced to the target frame rate while backing off when
//! the socket's outbound queue grows.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use camlink::{CaptureClient, ClientConfig, SyntheticBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), camlink::Error> {
//!     let client = CaptureClient::builder(
//!         ClientConfig::for_host("192.168.1.20:4104"),
//!         Arc::new(SyntheticBackend::default()),
//!     )
//!     .build()
//!     .await?;
//!
//!     let mut events = client.events();
//!     client.boot().await?;
//!     client.toggle().await?;
//!
//!     while let Some(event) = events.next().await {
//!         println!("Client event: {:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use camlink_core::{
    endpoint_url, CamlinkError, CloseReason, ConnectionState, FrameLink, LinkConfig, TlsMode,
    WebSocketLink,
};

pub use camlink_media::{
    reconcile, CaptureConstraints, CaptureStream, CaptureTarget, DeviceDescriptor, FrameEncoder,
    HardwareCapability, JpegFrameEncoder, MediaBackend, MediaDeviceInfo, MediaError, Negotiated,
    OptionSet, Orientation, PipelineStats, Resolution, StreamConfig, SyntheticBackend,
    SyntheticConfig,
};

#[cfg(feature = "receiver")]
pub use camlink_receiver::{FrameReceiver, ReceiverConfig, ReceiverEvent, ReceiverHandle};

// Public API modules
pub mod client;
pub mod config;
pub mod controller;
pub mod destination;
pub mod error;
pub mod event;
pub mod logging;

// Re-export main API types
pub use client::{CaptureClient, CaptureClientBuilder, TargetChange};
pub use config::{ClientConfig, FALLBACK_DESTINATION};
pub use controller::ConnectionController;
#[cfg(feature = "receiver")]
pub use destination::ReceiverDestination;
pub use destination::{resolve_destination, DestinationProvider, StaticDestination};
pub use error::{Error, Result};
pub use event::{ClientEvent, EventStream};
pub use logging::init_logging;
