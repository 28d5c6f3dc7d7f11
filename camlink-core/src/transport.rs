//! WebSocket frame link with an observable outbound queue
//!
//! The link mirrors the semantics a browser socket gives its caller: `send_text`
//! only enqueues, and `buffered_amount` reports how many payload bytes are still
//! waiting to be written. The streaming pipeline uses that number as its only
//! congestion signal.

use crate::connection::CloseReason;
use crate::error::{CamlinkError, CamlinkResult};
use crate::tls::{self, TlsMode};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound side of a frame connection as seen by the streaming pipeline
pub trait FrameLink: Send + Sync {
    /// Whether frames may currently be sent
    fn is_open(&self) -> bool;

    /// Payload bytes queued but not yet written to the socket
    fn buffered_amount(&self) -> usize;

    /// Queue one text message; never blocks
    fn send_text(&self, text: String) -> CamlinkResult<()>;
}

/// Connection settings for [`WebSocketLink`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Handshake timeout
    #[serde(with = "crate::duration_ms")]
    pub connect_timeout: Duration,
    /// Certificate policy for `wss://` endpoints
    pub tls: TlsMode,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            tls: TlsMode::default(),
        }
    }
}

/// Build the socket URL for a host and endpoint path.
///
/// `secure` selects `wss`; the path gets a leading slash when it lacks one.
pub fn endpoint_url(host: &str, path: &str, secure: bool) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    if path.starts_with('/') {
        format!("{}://{}{}", scheme, host, path)
    } else {
        format!("{}://{}/{}", scheme, host, path)
    }
}

/// State shared between the link handle and its socket tasks
#[derive(Debug)]
struct LinkShared {
    open: AtomicBool,
    buffered: AtomicUsize,
    closed_tx: Mutex<Option<oneshot::Sender<CloseReason>>>,
}

impl LinkShared {
    /// Record the end of the connection; only the first reason is reported.
    fn mark_closed(&self, reason: CloseReason) {
        self.open.store(false, Ordering::Release);
        if let Some(tx) = self.closed_tx.lock().take() {
            debug!("Link closed: {}", reason);
            let _ = tx.send(reason);
        }
    }
}

/// Resolves once the link has ended, with the first observed cause
#[derive(Debug)]
pub struct LinkMonitor {
    closed_rx: oneshot::Receiver<CloseReason>,
}

impl LinkMonitor {
    /// Wait for the link to close.
    pub async fn closed(self) -> CloseReason {
        self.closed_rx.await.unwrap_or(CloseReason::Local)
    }
}

/// Client WebSocket connection to the viewer
#[derive(Debug)]
pub struct WebSocketLink {
    url: String,
    shared: Arc<LinkShared>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl WebSocketLink {
    /// Dial `url` and start the socket reader and writer tasks.
    pub async fn connect(url: &str, config: &LinkConfig) -> CamlinkResult<(Self, LinkMonitor)> {
        let connector = if url.starts_with("wss://") {
            Some(Connector::Rustls(tls::client_config(config.tls)?))
        } else {
            None
        };

        debug!("Connecting to {}", url);
        let (socket, _response) = tokio::time::timeout(
            config.connect_timeout,
            connect_async_tls_with_config(url, None, false, connector),
        )
        .await
        .map_err(|_| CamlinkError::Timeout {
            operation: format!("connect {}", url),
            duration: config.connect_timeout,
        })?
        .map_err(|e| CamlinkError::Connection {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        info!("Connected to {}", url);
        Ok(Self::from_socket(url, socket))
    }

    fn from_socket(url: &str, socket: ClientSocket) -> (Self, LinkMonitor) {
        let (sink, stream) = socket.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = oneshot::channel();

        let shared = Arc::new(LinkShared {
            open: AtomicBool::new(true),
            buffered: AtomicUsize::new(0),
            closed_tx: Mutex::new(Some(closed_tx)),
        });

        tokio::spawn(write_loop(sink, outbound_rx, shared.clone()));
        tokio::spawn(read_loop(stream, shared.clone()));

        let link = Self {
            url: url.to_string(),
            shared,
            outbound,
        };
        (link, LinkMonitor { closed_rx })
    }

    /// Endpoint this link is connected to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start a graceful close. Safe to call more than once.
    pub fn close(&self) {
        if self.shared.open.swap(false, Ordering::AcqRel) {
            let _ = self.outbound.send(Message::Close(None));
        }
        self.shared.mark_closed(CloseReason::Local);
    }
}

impl FrameLink for WebSocketLink {
    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    fn buffered_amount(&self) -> usize {
        self.shared.buffered.load(Ordering::Acquire)
    }

    fn send_text(&self, text: String) -> CamlinkResult<()> {
        if !self.is_open() {
            return Err(CamlinkError::LinkClosed);
        }

        let size = text.len();
        self.shared.buffered.fetch_add(size, Ordering::AcqRel);
        if self.outbound.send(Message::Text(text)).is_err() {
            self.shared.buffered.fetch_sub(size, Ordering::AcqRel);
            self.shared
                .mark_closed(CloseReason::Error("writer task stopped".to_string()));
            return Err(CamlinkError::LinkClosed);
        }
        Ok(())
    }
}

async fn write_loop(
    mut sink: SplitSink<ClientSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    shared: Arc<LinkShared>,
) {
    while let Some(message) = outbound.recv().await {
        let is_close = matches!(message, Message::Close(_));
        let size = match &message {
            Message::Text(text) => text.len(),
            _ => 0,
        };

        let result = sink.send(message).await;
        shared.buffered.fetch_sub(size, Ordering::AcqRel);

        if let Err(e) = result {
            warn!("WebSocket write failed: {}", e);
            shared.mark_closed(CloseReason::Error(e.to_string()));
            break;
        }
        if is_close {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(mut stream: SplitStream<ClientSocket>, shared: Arc<LinkShared>) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Close(_))) | None => break CloseReason::Peer,
            Some(Ok(_)) => {
                // The viewer never sends application data
            }
            Some(Err(e)) => break CloseReason::Error(e.to_string()),
        }
    };
    shared.mark_closed(reason);
}
