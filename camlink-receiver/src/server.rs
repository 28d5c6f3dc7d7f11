//! Frame receiver server
//!
//! Accepts capture clients on a single WebSocket path and turns what they send
//! into [`ReceiverEvent`]s for the viewer shell.

use crate::cert::CertificateConfig;
use camlink_core::CamlinkError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use rustls::ServerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Port the receiver listens on by default
pub const DEFAULT_PORT: u16 = 4104;

/// Receiver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Listen address
    pub bind_address: SocketAddr,
    /// Serve `wss` instead of plain `ws`
    pub tls: bool,
    /// WebSocket endpoint path
    pub path: String,
    /// Certificate used when `tls` is set
    pub certificate: CertificateConfig,
    /// Capacity of the event channel
    pub event_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            tls: true,
            path: "/ws".to_string(),
            certificate: CertificateConfig::default(),
            event_capacity: 64,
        }
    }
}

/// Events emitted toward the viewer shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ReceiverEvent {
    /// A capture client completed the WebSocket handshake
    ClientConnected {
        /// Connection identifier
        connection_id: String,
    },
    /// One frame, as the `data:image/jpeg;base64,...` text the client sent
    #[serde(rename = "camera-frame")]
    Frame {
        /// Connection identifier
        connection_id: String,
        /// Frame text
        payload: String,
    },
    /// The client's socket ended
    ClientDisconnected {
        /// Connection identifier
        connection_id: String,
    },
}

impl ReceiverEvent {
    /// Name the shell knows this event by
    pub fn event_name(&self) -> &'static str {
        match self {
            ReceiverEvent::ClientConnected { .. } => "client-connected",
            ReceiverEvent::Frame { .. } => "camera-frame",
            ReceiverEvent::ClientDisconnected { .. } => "client-disconnected",
        }
    }

    /// Connection the event belongs to
    pub fn connection_id(&self) -> &str {
        match self {
            ReceiverEvent::ClientConnected { connection_id }
            | ReceiverEvent::Frame { connection_id, .. }
            | ReceiverEvent::ClientDisconnected { connection_id } => connection_id,
        }
    }

    /// Check if this is a frame event
    pub fn is_frame(&self) -> bool {
        matches!(self, ReceiverEvent::Frame { .. })
    }
}

/// A connected capture client
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    /// Connection identifier
    pub connection_id: String,
    /// Remote address
    pub remote_addr: SocketAddr,
    /// Handshake time
    pub connected_at: DateTime<Utc>,
}

struct Shared {
    path: String,
    acceptor: Option<TlsAcceptor>,
    events: broadcast::Sender<ReceiverEvent>,
    clients: DashMap<String, ClientInfo>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("path", &self.path)
            .field("tls", &self.acceptor.is_some())
            .field("clients", &self.clients.len())
            .finish()
    }
}

/// WebSocket endpoint capture clients stream to
#[derive(Debug)]
pub struct FrameReceiver {
    listener: TcpListener,
    local_addr: SocketAddr,
    shared: Arc<Shared>,
}

impl FrameReceiver {
    /// Bind the listener and prepare TLS.
    pub async fn bind(config: ReceiverConfig) -> Result<Self, CamlinkError> {
        let acceptor = if config.tls {
            Some(tls_acceptor(&config.certificate)?)
        } else {
            None
        };

        let listener = TcpListener::bind(config.bind_address)
            .await
            .map_err(|e| CamlinkError::ServerStartFailed {
                address: config.bind_address,
                source: e.into(),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| CamlinkError::ServerStartFailed {
                address: config.bind_address,
                source: e.into(),
            })?;

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let scheme = if config.tls { "wss" } else { "ws" };
        info!(
            "Frame receiver listening on {}://{}{}",
            scheme, local_addr, config.path
        );

        Ok(Self {
            listener,
            local_addr,
            shared: Arc::new(Shared {
                path: config.path,
                acceptor,
                events,
                clients: DashMap::new(),
            }),
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscribe to receiver events
    pub fn subscribe(&self) -> broadcast::Receiver<ReceiverEvent> {
        self.shared.events.subscribe()
    }

    /// Handle for observing the receiver after `run` has taken it
    pub fn handle(&self) -> ReceiverHandle {
        ReceiverHandle {
            shared: self.shared.clone(),
        }
    }

    /// Accept clients until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Frame receiver shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        debug!("New connection from {}", remote_addr);
                        let shared = self.shared.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_connection(shared, stream, remote_addr, shutdown).await;
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }
    }

    /// Spawn the accept loop.
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Observer for a running receiver
#[derive(Debug, Clone)]
pub struct ReceiverHandle {
    shared: Arc<Shared>,
}

impl ReceiverHandle {
    /// Subscribe to receiver events
    pub fn subscribe(&self) -> broadcast::Receiver<ReceiverEvent> {
        self.shared.events.subscribe()
    }

    /// Currently connected clients
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.shared
            .clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.shared.clients.len()
    }
}

fn tls_acceptor(certificate: &CertificateConfig) -> Result<TlsAcceptor, CamlinkError> {
    let (chain, key) = certificate.load()?;
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| CamlinkError::Tls {
            reason: format!("Unsupported protocol versions: {}", e),
        })?
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| CamlinkError::Tls {
            reason: format!("Invalid server certificate: {}", e),
        })?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

async fn handle_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    shutdown: CancellationToken,
) {
    match shared.acceptor.clone() {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls) => serve_socket(shared, tls, remote_addr, shutdown).await,
            Err(e) => warn!("TLS handshake with {} failed: {}", remote_addr, e),
        },
        None => serve_socket(shared, stream, remote_addr, shutdown).await,
    }
}

async fn serve_socket<S>(
    shared: Arc<Shared>,
    stream: S,
    remote_addr: SocketAddr,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let path = shared.path.clone();
    let check_path = move |request: &Request, response: Response| {
        if request.uri().path() == path {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let mut socket = match accept_hdr_async(stream, check_path).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", remote_addr, e);
            return;
        }
    };

    let connection_id = Uuid::new_v4().to_string();
    shared.clients.insert(
        connection_id.clone(),
        ClientInfo {
            connection_id: connection_id.clone(),
            remote_addr,
            connected_at: Utc::now(),
        },
    );
    info!("Client {} connected from {}", connection_id, remote_addr);
    let _ = shared.events.send(ReceiverEvent::ClientConnected {
        connection_id: connection_id.clone(),
    });

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = socket.next() => message,
        };
        match message {
            Some(Ok(Message::Text(payload))) => {
                let _ = shared.events.send(ReceiverEvent::Frame {
                    connection_id: connection_id.clone(),
                    payload,
                });
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!("Client {} socket error: {}", connection_id, e);
                break;
            }
        }
    }

    let _ = socket.close(None).await;
    shared.clients.remove(&connection_id);
    info!("Client {} disconnected", connection_id);
    let _ = shared
        .events
        .send(ReceiverEvent::ClientDisconnected { connection_id });
}
