//! Connection controller
//!
//! Owns the WebSocket link to the viewer and the streaming pipeline that feeds
//! it. Every way a connection can end (stop button, peer close, socket error,
//! failed dial) goes through [`ControllerInner::close_once`], so teardown and
//! the `Disconnected` event happen exactly once per connection.

use crate::config::ClientConfig;
use crate::error::Result;
use crate::event::ClientEvent;
use camlink_core::{CamlinkError, CloseReason, ConnectionState, FrameLink, LinkConfig, WebSocketLink};
use camlink_media::{
    CaptureSlot, DisplayClock, FrameEncoder, PipelineStats, StreamConfig, StreamingPipeline,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STATUS_STABILIZING: &str = "Waiting for camera to stabilize...";
const STATUS_CONNECTED: &str = "Connected!";
const STATUS_DISCONNECTED: &str = "Disconnected";
const STATUS_CONNECTION_ERROR: &str = "Connection error";

/// Drives `Idle -> Connecting -> Open -> Closing -> Closed`
#[derive(Clone)]
pub struct ConnectionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    url: String,
    link_config: LinkConfig,
    stream_config: StreamConfig,
    slot: CaptureSlot,
    encoder: Arc<dyn FrameEncoder>,
    frame_rate: watch::Receiver<u32>,
    events: broadcast::Sender<ClientEvent>,
    attempt: Mutex<Attempt>,
    last_stats: Mutex<Option<PipelineStats>>,
}

/// Bookkeeping for the current (or last) connection
struct Attempt {
    state: ConnectionState,
    generation: u64,
    cancel: CancellationToken,
    link: Option<Arc<WebSocketLink>>,
}

impl ConnectionController {
    /// Controller streaming the capture in `slot` to the endpoint in `config`
    pub fn new(
        config: &ClientConfig,
        slot: CaptureSlot,
        encoder: Arc<dyn FrameEncoder>,
        frame_rate: watch::Receiver<u32>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                url: config.endpoint(),
                link_config: config.link_config(),
                stream_config: config.stream.clone(),
                slot,
                encoder,
                frame_rate,
                events,
                attempt: Mutex::new(Attempt {
                    state: ConnectionState::Idle,
                    generation: 0,
                    cancel: CancellationToken::new(),
                    link: None,
                }),
                last_stats: Mutex::new(None),
            }),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.attempt.lock().state
    }

    /// Endpoint the controller dials
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Counters of the last pipeline that finished
    pub fn last_stats(&self) -> Option<PipelineStats> {
        self.inner.last_stats.lock().clone()
    }

    /// Stop when open, otherwise connect.
    ///
    /// Ignored while a connection is being set up or torn down.
    pub async fn toggle(&self) -> Result<ConnectionState> {
        let current = self.state();
        match current {
            ConnectionState::Open => {
                self.stop();
            }
            ConnectionState::Idle | ConnectionState::Closed => {
                self.start().await?;
            }
            ConnectionState::Connecting | ConnectionState::Closing => {
                debug!("Toggle ignored while {}", current);
            }
        }
        Ok(self.state())
    }

    /// Wait for the camera to produce frames, connect, and start streaming.
    ///
    /// Returns once the connection is open (or the attempt was stopped). A
    /// failed dial closes the attempt and is returned as the error.
    pub async fn start(&self) -> Result<()> {
        let (generation, cancel) = {
            let mut attempt = self.inner.attempt.lock();
            if !attempt.state.can_connect() {
                return Err(CamlinkError::InvalidState {
                    expected: "idle or closed".to_string(),
                    actual: attempt.state.to_string(),
                }
                .into());
            }
            attempt.generation += 1;
            attempt.cancel = CancellationToken::new();
            self.inner.set_state(&mut attempt, ConnectionState::Connecting);
            (attempt.generation, attempt.cancel.clone())
        };

        if !self.inner.wait_for_frames(&cancel).await {
            debug!("Connection attempt stopped while waiting for camera");
            return Ok(());
        }

        let dialed = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Connection attempt stopped while dialing");
                return Ok(());
            }
            dialed = WebSocketLink::connect(&self.inner.url, &self.inner.link_config) => dialed,
        };

        let (link, monitor) = match dialed {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Failed to connect to {}: {}", self.inner.url, e);
                self.inner
                    .close_once(generation, CloseReason::Error(e.to_string()));
                return Err(e.into());
            }
        };
        let link = Arc::new(link);

        {
            let mut attempt = self.inner.attempt.lock();
            if attempt.generation != generation || attempt.state != ConnectionState::Connecting {
                debug!("Connection attempt superseded, closing new link");
                link.close();
                return Ok(());
            }
            self.inner.set_state(&mut attempt, ConnectionState::Open);
            attempt.link = Some(link.clone());
            self.inner.spawn_pipeline(link.clone(), cancel.child_token());
        }

        info!("Streaming to {}", self.inner.url);
        self.inner.emit(ClientEvent::Connected {
            url: self.inner.url.clone(),
        });
        self.inner.status(STATUS_CONNECTED);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let reason = monitor.closed().await;
            inner.close_once(generation, reason);
        });

        Ok(())
    }

    /// Close the current connection (or abandon the current attempt).
    ///
    /// Returns `false` when there was nothing to close.
    pub fn stop(&self) -> bool {
        let generation = self.inner.attempt.lock().generation;
        self.inner.close_once(generation, CloseReason::Local)
    }
}

impl ControllerInner {
    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn status(&self, status: &str) {
        self.emit(ClientEvent::StatusChanged {
            status: status.to_string(),
        });
    }

    fn set_state(&self, attempt: &mut Attempt, next: ConnectionState) {
        if !attempt.state.can_transition_to(next) {
            warn!("Unexpected connection transition {} -> {}", attempt.state, next);
        }
        debug!("Connection {} -> {}", attempt.state, next);
        attempt.state = next;
        self.emit(ClientEvent::ConnectionStateChanged { state: next });
    }

    /// Poll the capture slot until the live stream reports a frame size.
    ///
    /// Returns `false` if the attempt was cancelled first.
    async fn wait_for_frames(&self, cancel: &CancellationToken) -> bool {
        let mut announced = false;
        loop {
            let ready = self
                .slot
                .read()
                .as_ref()
                .and_then(|handle| handle.video_size())
                .is_some();
            if ready {
                return true;
            }
            if !announced {
                self.status(STATUS_STABILIZING);
                announced = true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.stream_config.stabilize_poll) => {}
            }
        }
    }

    fn spawn_pipeline(self: &Arc<Self>, link: Arc<WebSocketLink>, cancel: CancellationToken) {
        let link: Arc<dyn FrameLink> = link;
        let pipeline = StreamingPipeline::new(
            link,
            self.slot.clone(),
            self.encoder.clone(),
            self.frame_rate.clone(),
            self.stream_config.clone(),
            cancel,
        );

        let inner = self.clone();
        tokio::spawn(async move {
            let stats = pipeline.run(DisplayClock::default()).await;
            *inner.last_stats.lock() = Some(stats);
        });
    }

    /// Tear down connection `generation`; later calls for it are no-ops.
    fn close_once(&self, generation: u64, reason: CloseReason) -> bool {
        let mut attempt = self.attempt.lock();
        if attempt.generation != generation {
            return false;
        }
        let current = attempt.state;
        match current {
            ConnectionState::Idle | ConnectionState::Closed => return false,
            ConnectionState::Open => self.set_state(&mut attempt, ConnectionState::Closing),
            ConnectionState::Connecting | ConnectionState::Closing => {}
        }

        attempt.cancel.cancel();
        if let Some(link) = attempt.link.take() {
            link.close();
        }
        self.set_state(&mut attempt, ConnectionState::Closed);
        drop(attempt);

        info!("Connection closed: {}", reason);
        let status = match reason {
            CloseReason::Error(_) => STATUS_CONNECTION_ERROR,
            CloseReason::Local | CloseReason::Peer => STATUS_DISCONNECTED,
        };
        self.emit(ClientEvent::Disconnected {
            reason: reason.to_string(),
        });
        self.status(status);
        true
    }
}

impl std::fmt::Debug for ConnectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionController")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .finish()
    }
}
