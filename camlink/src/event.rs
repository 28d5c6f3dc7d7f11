//! Events the capture client reports to its host UI

use camlink_core::ConnectionState;
use camlink_media::{DeviceDescriptor, Negotiated};
use futures::stream::{self, Stream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

/// Something the host UI should reflect
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Human-readable status line changed
    StatusChanged {
        /// New status text
        status: String,
    },
    /// A failure left the client unusable and needs the user's attention
    Notice {
        /// Message to show
        message: String,
    },
    /// The camera list was refreshed
    DevicesChanged {
        /// Video inputs, in platform order
        devices: Vec<DeviceDescriptor>,
    },
    /// The frame-rate and resolution pickers were rebuilt
    OptionsChanged {
        /// Negotiated option sets and selections
        options: Negotiated,
    },
    /// Connection state moved
    ConnectionStateChanged {
        /// New state
        state: ConnectionState,
    },
    /// Connection established and streaming started
    Connected {
        /// Endpoint the client connected to
        url: String,
    },
    /// Connection ended; the start action is available again
    Disconnected {
        /// Why the connection ended
        reason: String,
    },
}

impl ClientEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::StatusChanged { .. } => "status_changed",
            ClientEvent::Notice { .. } => "notice",
            ClientEvent::DevicesChanged { .. } => "devices_changed",
            ClientEvent::OptionsChanged { .. } => "options_changed",
            ClientEvent::ConnectionStateChanged { .. } => "connection_state_changed",
            ClientEvent::Connected { .. } => "connected",
            ClientEvent::Disconnected { .. } => "disconnected",
        }
    }

    /// Check if this is a connection-related event
    pub fn is_connection_event(&self) -> bool {
        matches!(
            self,
            ClientEvent::ConnectionStateChanged { .. }
                | ClientEvent::Connected { .. }
                | ClientEvent::Disconnected { .. }
        )
    }

    /// Check if this is a capture-related event
    pub fn is_capture_event(&self) -> bool {
        matches!(
            self,
            ClientEvent::DevicesChanged { .. } | ClientEvent::OptionsChanged { .. }
        )
    }

    /// Check if this event needs the user's attention
    pub fn is_notice(&self) -> bool {
        matches!(self, ClientEvent::Notice { .. })
    }
}

/// Receiving end of the client's event channel
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<ClientEvent>,
}

impl EventStream {
    pub(crate) fn new(receiver: broadcast::Receiver<ClientEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event; `None` once the client is gone.
    ///
    /// Events missed because the reader fell behind are skipped.
    pub async fn next(&mut self) -> Option<ClientEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Event stream lagged, {} events dropped", missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take an event if one is ready.
    pub fn try_next(&mut self) -> Option<ClientEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
    /// Adapt into a [`Stream`] for use with stream combinators.
    pub fn into_stream(self) -> impl Stream<Item = ClientEvent> + Send + 'static {
        stream::unfold(self, |mut events| async move {
            let event = events.next().await?;
            Some((event, events))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_classification() {
        let connected = ClientEvent::Connected {
            url: "wss://localhost:4104/ws".to_string(),
        };
        assert_eq!(connected.event_type(), "connected");
        assert!(connected.is_connection_event());
        assert!(!connected.is_capture_event());

        let devices = ClientEvent::DevicesChanged { devices: vec![] };
        assert!(devices.is_capture_event());

        let notice = ClientEvent::Notice {
            message: "Camera error".to_string(),
        };
        assert!(notice.is_notice());
        assert_eq!(notice.event_type(), "notice");
    }

    #[tokio::test]
    async fn test_event_stream_skips_lag() {
        let (tx, rx) = broadcast::channel(2);
        let mut stream = EventStream::new(rx);
        for i in 0..4 {
            tx.send(ClientEvent::StatusChanged {
                status: format!("status {}", i),
            })
            .unwrap();
        }

        let first = stream.next().await.unwrap();
        assert_eq!(
            first,
            ClientEvent::StatusChanged {
                status: "status 2".to_string()
            }
        );
        assert!(stream.try_next().is_some());
        assert!(stream.try_next().is_none());

        drop(tx);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_into_stream_filters_connection_events() {
        use futures::StreamExt;

        let (tx, rx) = broadcast::channel(16);
        let events = EventStream::new(rx).into_stream();
        tx.send(ClientEvent::StatusChanged {
            status: "Connected!".to_string(),
        })
        .unwrap();
        tx.send(ClientEvent::Connected {
            url: "ws://localhost:4104/ws".to_string(),
        })
        .unwrap();
        tx.send(ClientEvent::Disconnected {
            reason: "closed locally".to_string(),
        })
        .unwrap();
        drop(tx);

        let kinds: Vec<&'static str> = events
            .filter(|e| futures::future::ready(e.is_connection_event()))
            .map(|e| e.event_type())
            .collect()
            .await;
        assert_eq!(kinds, vec!["connected", "disconnected"]);
    }
}
