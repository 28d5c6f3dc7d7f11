//! Configuration types and defaults

use crate::error::Result;
use camlink_core::{endpoint_url, CamlinkError, LinkConfig, TlsMode};
use camlink_media::{CaptureTarget, StreamConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Destination shown when the shell cannot report one
pub const FALLBACK_DESTINATION: &str = "http://localhost:8080";

/// Capture client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Viewer host and port, e.g. `192.168.1.20:4104`
    pub host: String,
    /// WebSocket endpoint path on the viewer
    pub path: String,
    /// Use `wss` instead of `ws`
    pub secure: bool,
    /// Trust the viewer's self-signed certificate
    pub accept_invalid_certs: bool,
    /// Handshake timeout
    #[serde(with = "camlink_core::duration_ms")]
    pub connect_timeout: Duration,
    /// Capture parameters requested at boot
    pub target: CaptureTarget,
    /// Streaming pipeline parameters
    pub stream: StreamConfig,
    /// Settle delay for display-orientation events
    #[serde(with = "camlink_core::duration_ms")]
    pub orientation_debounce: Duration,
    /// Destination shown when the shell cannot report one
    pub fallback_destination: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost:4104".to_string(),
            path: "/ws".to_string(),
            secure: true,
            accept_invalid_certs: true,
            connect_timeout: Duration::from_secs(10),
            target: CaptureTarget::default(),
            stream: StreamConfig::default(),
            orientation_debounce: Duration::from_millis(500),
            fallback_destination: FALLBACK_DESTINATION.to_string(),
        }
    }
}

impl ClientConfig {
    /// Configuration streaming to `host` with every other setting at its default
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CamlinkError::InvalidConfiguration {
                message: format!("Malformed client configuration: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(invalid("host must not be empty").into());
        }
        self.target.validate()?;

        let quality = self.stream.jpeg_quality;
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(invalid(format!("JPEG quality {} is outside (0, 1]", quality)).into());
        }
        if self.stream.stabilize_poll.is_zero() {
            return Err(invalid("stabilize poll interval must be > 0").into());
        }
        Ok(())
    }

    /// Socket URL the client dials
    pub fn endpoint(&self) -> String {
        endpoint_url(&self.host, &self.path, self.secure)
    }

    /// Transport settings derived from this configuration
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            connect_timeout: self.connect_timeout,
            tls: if self.accept_invalid_certs {
                TlsMode::AcceptInvalidCerts
            } else {
                TlsMode::Verified
            },
        }
    }
}

fn invalid(message: impl Into<String>) -> CamlinkError {
    CamlinkError::InvalidConfiguration {
        message: message.into(),
    }
}
