//! # camlink receiver
//!
//! The viewer side of a camlink connection: a TLS WebSocket endpoint at `/ws`
//! that turns each text message from a capture client into a frame event, plus
//! the stream URL the viewer shows so clients know where to connect.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod cert;
pub mod server;
pub mod url;

// Re-export main types
pub use cert::CertificateConfig;
pub use server::{ClientInfo, FrameReceiver, ReceiverConfig, ReceiverEvent, ReceiverHandle, DEFAULT_PORT};
pub use url::{stream_url, stream_url_for};
