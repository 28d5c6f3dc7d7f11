//! Where the host tells users to point their capture client

use crate::error::Result;
use async_trait::async_trait;
use tracing::warn;

/// Answers the one-time "where are we streaming to" query at startup
#[async_trait]
pub trait DestinationProvider: Send + Sync {
    /// Human-readable address of the viewer
    async fn destination(&self) -> Result<String>;
}

/// A fixed destination
#[derive(Debug, Clone)]
pub struct StaticDestination {
    address: String,
}

impl StaticDestination {
    /// Always answer `address`
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl DestinationProvider for StaticDestination {
    async fn destination(&self) -> Result<String> {
        Ok(self.address.clone())
    }
}

/// Destination of a local receiver, resolved from the machine's LAN address
#[cfg(feature = "receiver")]
#[derive(Debug, Clone, Copy)]
pub struct ReceiverDestination {
    port: u16,
}

#[cfg(feature = "receiver")]
impl ReceiverDestination {
    /// Receiver listening on `port`
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[cfg(feature = "receiver")]
impl Default for ReceiverDestination {
    fn default() -> Self {
        Self::new(camlink_receiver::DEFAULT_PORT)
    }
}

#[cfg(feature = "receiver")]
#[async_trait]
impl DestinationProvider for ReceiverDestination {
    async fn destination(&self) -> Result<String> {
        Ok(camlink_receiver::stream_url(self.port))
    }
}

/// Ask `provider` once, answering `fallback` when it fails.
pub async fn resolve_destination(provider: &dyn DestinationProvider, fallback: &str) -> String {
    match provider.destination().await {
        Ok(address) => address,
        Err(e) => {
            warn!("Destination unavailable ({}), using {}", e, fallback);
            fallback.to_string()
        }
    }
}
