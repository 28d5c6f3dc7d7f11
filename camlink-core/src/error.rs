//! Error types for camlink

use std::time::Duration;
use thiserror::Error;

/// Main error type for camlink transport and lifecycle operations
#[derive(Error, Debug)]
pub enum CamlinkError {
    /// Missing or invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// What is wrong with the configuration
        message: String,
    },

    /// Connection could not be established
    #[error("Connection to {url} failed: {reason}")]
    Connection {
        /// Endpoint that was dialed
        url: String,
        /// Reason for connection failure
        reason: String,
    },

    /// Transport error on an established connection
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for transport error
        reason: String,
    },

    /// The link is not open
    #[error("Link is not open")]
    LinkClosed,

    /// TLS setup failed
    #[error("TLS error: {reason}")]
    Tls {
        /// Reason for the TLS failure
        reason: String,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Operation timed out error
    #[error("Operation timed out: {operation} after {duration:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Duration after which timeout occurred
        duration: Duration,
    },

    /// Server start failed
    #[error("Failed to start server on {address}: {source}")]
    ServerStartFailed {
        /// Address that failed to bind
        address: std::net::SocketAddr,
        /// Underlying error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Certificate generation or loading failed
    #[error("Certificate error: {reason}")]
    Certificate {
        /// Reason for the failure
        reason: String,
    },
}

/// Result type alias for camlink core operations
pub type CamlinkResult<T> = Result<T, CamlinkError>;

impl CamlinkError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            CamlinkError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            CamlinkError::Connection { .. } => "CONNECTION_FAILED",
            CamlinkError::Transport { .. } => "TRANSPORT_ERROR",
            CamlinkError::LinkClosed => "LINK_CLOSED",
            CamlinkError::Tls { .. } => "TLS_ERROR",
            CamlinkError::InvalidState { .. } => "INVALID_STATE",
            CamlinkError::Timeout { .. } => "TIMEOUT",
            CamlinkError::ServerStartFailed { .. } => "SERVER_START_FAILED",
            CamlinkError::Certificate { .. } => "CERTIFICATE_ERROR",
        }
    }

    /// Whether the error belongs to the transport family.
    ///
    /// Transport failures are never retried automatically; they unwind to the
    /// connection's close path and leave the start action available again.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CamlinkError::Connection { .. }
                | CamlinkError::Transport { .. }
                | CamlinkError::LinkClosed
                | CamlinkError::Tls { .. }
                | CamlinkError::Timeout { .. }
        )
    }
}
