//! Connection lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the duplex connection to the viewer
///
/// ```text
/// Idle -> Connecting -> Open -> Closing -> Closed
///         Connecting ---------------------> Closed   (error / refused)
///                       Open -------------> Closed   (peer close / error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Nothing has been attempted yet
    Idle,
    /// Handshake in progress
    Connecting,
    /// Frames may be sent
    Open,
    /// Graceful close requested locally
    Closing,
    /// Connection ended, by any cause
    Closed,
}

impl ConnectionState {
    /// Whether a new connection attempt may start from this state.
    pub fn can_connect(&self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::Closed)
    }

    /// Whether the state is one the close path may still transition out of.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Closing
        )
    }

    /// Check a transition against the lifecycle graph.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Closed, Connecting)
                | (Connecting, Open)
                | (Connecting, Closed)
                | (Open, Closing)
                | (Open, Closed)
                | (Closing, Closed)
        )
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Idle
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by the local side
    Local,
    /// The peer sent a close frame or the stream ended
    Peer,
    /// The socket failed
    Error(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Local => f.write_str("closed locally"),
            CloseReason::Peer => f.write_str("closed by peer"),
            CloseReason::Error(reason) => write!(f, "transport error: {}", reason),
        }
    }
}
