//! # camlink core
//!
//! Transport foundation for camlink: the error type shared by every crate,
//! the connection state machine vocabulary, and the WebSocket frame link that
//! carries encoded camera frames to the viewer.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod duration_ms;
pub mod error;
pub mod tls;
pub mod transport;

// Re-export main types
pub use connection::{CloseReason, ConnectionState};
pub use error::{CamlinkError, CamlinkResult};
pub use tls::TlsMode;
pub use transport::{endpoint_url, FrameLink, LinkConfig, LinkMonitor, WebSocketLink};
