//! Capture client session object
//!
//! [`CaptureClient`] owns everything a running client needs: the selected
//! device and capture target, the one live capture handle, the connection
//! controller, and the event channel the host UI listens on. All target
//! changes go through [`CaptureClient::reconfigure`].

use crate::config::ClientConfig;
use crate::controller::ConnectionController;
use crate::destination::{resolve_destination, DestinationProvider};
use crate::error::Result;
use crate::event::{ClientEvent, EventStream};
use camlink_core::ConnectionState;
use camlink_media::{
    CaptureSessionManager, CaptureSlot, CaptureTarget, DeviceDescriptor, DeviceEnumerator,
    FrameEncoder, JpegFrameEncoder, MediaBackend, MediaError, Negotiated, Orientation,
    OrientationDebouncer, Resolution,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 128;
const STATUS_READY: &str = "Camera Ready (Press Start)";

/// One user-driven change to the capture target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChange {
    /// Switch to another camera
    Device(String),
    /// Request another resolution
    Resolution(Resolution),
    /// Request another orientation
    Orientation(Orientation),
    /// Request another frame rate
    FrameRate(u32),
}

impl TargetChange {
    fn apply(&self, target: &mut CaptureTarget) {
        match self {
            TargetChange::Device(id) => target.device_id = Some(id.clone()),
            TargetChange::Resolution(resolution) => {
                target.width = resolution.width;
                target.height = resolution.height;
            }
            TargetChange::Orientation(orientation) => target.orientation = *orientation,
            TargetChange::FrameRate(fps) => target.frame_rate = *fps,
        }
    }
}

/// Fluent builder for [`CaptureClient`]
pub struct CaptureClientBuilder {
    config: ClientConfig,
    backend: Arc<dyn MediaBackend>,
    encoder: Arc<dyn FrameEncoder>,
    destination: Option<Box<dyn DestinationProvider>>,
}

impl CaptureClientBuilder {
    /// Use a different frame encoder
    pub fn encoder(mut self, encoder: Arc<dyn FrameEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Ask `provider` for the destination shown to the user
    pub fn destination(mut self, provider: impl DestinationProvider + 'static) -> Self {
        self.destination = Some(Box::new(provider));
        self
    }

    /// Validate the configuration, resolve the destination, and create the client.
    ///
    /// No camera is touched until [`CaptureClient::boot`].
    pub async fn build(self) -> Result<CaptureClient> {
        self.config.validate()?;

        let destination = match &self.destination {
            Some(provider) => {
                resolve_destination(provider.as_ref(), &self.config.fallback_destination).await
            }
            None => self.config.fallback_destination.clone(),
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (frame_rate, frame_rate_rx) = watch::channel(self.config.target.frame_rate);

        let manager = CaptureSessionManager::new(self.backend.clone());
        let slot = manager.slot();
        let controller = ConnectionController::new(
            &self.config,
            slot.clone(),
            self.encoder,
            frame_rate_rx,
            events.clone(),
        );

        info!("Capture client ready, streaming to {}", controller.url());
        Ok(CaptureClient {
            inner: Arc::new(ClientInner {
                enumerator: DeviceEnumerator::new(self.backend),
                session: Mutex::new(Session {
                    manager,
                    target: self.config.target.clone(),
                    devices: Vec::new(),
                    booted: false,
                }),
                slot,
                controller,
                events,
                frame_rate,
                debouncer: OrientationDebouncer::new(self.config.orientation_debounce),
                destination,
                config: self.config,
            }),
        })
    }
}

/// Capture client: camera selection, negotiation, and streaming to a viewer
#[derive(Clone)]
pub struct CaptureClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    enumerator: DeviceEnumerator,
    session: Mutex<Session>,
    slot: CaptureSlot,
    controller: ConnectionController,
    events: broadcast::Sender<ClientEvent>,
    frame_rate: watch::Sender<u32>,
    debouncer: OrientationDebouncer,
    destination: String,
}

/// Capture state changed only under the session lock
struct Session {
    manager: CaptureSessionManager,
    target: CaptureTarget,
    devices: Vec<DeviceDescriptor>,
    booted: bool,
}

impl CaptureClient {
    /// Start building a client over a platform media backend
    pub fn builder(config: ClientConfig, backend: Arc<dyn MediaBackend>) -> CaptureClientBuilder {
        CaptureClientBuilder {
            config,
            backend,
            encoder: Arc::new(JpegFrameEncoder::new()),
            destination: None,
        }
    }

    /// Subscribe to client events
    pub fn events(&self) -> EventStream {
        EventStream::new(self.inner.events.subscribe())
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Destination resolved at startup
    pub fn destination(&self) -> &str {
        &self.inner.destination
    }

    /// Connection controller
    pub fn controller(&self) -> &ConnectionController {
        &self.inner.controller
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.controller.state()
    }

    /// Whether a capture handle is live
    pub fn is_capturing(&self) -> bool {
        self.inner.slot.read().is_some()
    }

    /// Current capture target
    pub async fn target(&self) -> CaptureTarget {
        self.inner.session.lock().await.target.clone()
    }

    /// Cameras found by the last enumeration
    pub async fn devices(&self) -> Vec<DeviceDescriptor> {
        self.inner.session.lock().await.devices.clone()
    }

    /// Options and selections from the last negotiation
    pub async fn negotiated(&self) -> Option<Negotiated> {
        self.inner.session.lock().await.manager.negotiated().cloned()
    }

    /// Enumerate cameras, select the first one, and acquire it.
    ///
    /// Calling it again refreshes the device list: the live capture is
    /// released before enumerating and reacquired afterwards, keeping the
    /// selected camera while it is still listed. Failures are also reported
    /// as status text and, when they leave the client without a camera, a
    /// notice.
    pub async fn boot(&self) -> Result<()> {
        let mut session = self.inner.session.lock().await;

        // Enumeration opens its own stream to unlock labels
        if session.manager.is_live() {
            debug!("Releasing capture to refresh devices");
            session.manager.release();
        }

        match self.inner.enumerator.list_devices().await {
            Ok(devices) => {
                let selected_listed = session
                    .target
                    .device_id
                    .as_ref()
                    .is_some_and(|id| devices.iter().any(|d| &d.id == id));
                if !selected_listed {
                    session.target.device_id = devices.first().map(|d| d.id.clone());
                }
                info!("Found {} camera(s)", devices.len());
                session.devices = devices.clone();
                self.emit(ClientEvent::DevicesChanged { devices });
            }
            Err(e) => {
                warn!("Camera enumeration failed: {}", e);
                session.devices.clear();
                self.emit(ClientEvent::DevicesChanged {
                    devices: Vec::new(),
                });
                self.report(&e);
            }
        }

        session.booted = true;
        self.acquire_locked(&mut session).await
    }

    /// Apply one change to the capture target.
    ///
    /// A change that leaves the target as it was does nothing and returns
    /// `false`. Otherwise the target is updated and, once booted, the capture
    /// is torn down and reacquired.
    pub async fn reconfigure(&self, change: TargetChange) -> Result<bool> {
        let mut session = self.inner.session.lock().await;

        let mut next = session.target.clone();
        change.apply(&mut next);
        if next == session.target {
            debug!("Target unchanged by {:?}", change);
            return Ok(false);
        }
        next.validate()?;

        debug!("Reconfiguring capture: {:?}", change);
        session.target = next;
        self.inner.frame_rate.send_replace(session.target.frame_rate);

        if session.booted {
            self.acquire_locked(&mut session).await?;
        }
        Ok(true)
    }

    /// React to a display-orientation event.
    ///
    /// Bursts collapse into one reacquire after the configured settle delay.
    /// Nothing happens when no capture is live.
    pub fn orientation_changed(&self) {
        if !self.is_capturing() {
            debug!("Orientation change ignored, no live capture");
            return;
        }

        let client = self.clone();
        self.inner.debouncer.trigger(move || async move {
            if let Err(e) = client.refresh_capture().await {
                warn!("Reacquire after orientation change failed: {}", e);
            }
        });
    }

    /// Start or stop streaming.
    pub async fn toggle(&self) -> Result<ConnectionState> {
        self.inner.controller.toggle().await
    }

    /// Stop streaming and release the camera.
    pub async fn shutdown(&self) {
        self.inner.debouncer.cancel();
        self.inner.controller.stop();
        self.inner.session.lock().await.manager.release();
        info!("Capture client shut down");
    }

    /// Reacquire the live capture with the current target.
    async fn refresh_capture(&self) -> Result<()> {
        let mut session = self.inner.session.lock().await;
        if !session.manager.is_live() {
            return Ok(());
        }
        self.acquire_locked(&mut session).await
    }

    async fn acquire_locked(&self, session: &mut Session) -> Result<()> {
        let Session {
            manager, target, ..
        } = session;

        match manager.acquire(target).await {
            Ok(negotiated) => {
                let options = negotiated.clone();
                self.inner.frame_rate.send_replace(target.frame_rate);
                self.emit(ClientEvent::OptionsChanged { options });
                self.status(STATUS_READY);
                Ok(())
            }
            Err(e) => {
                warn!("Camera acquisition failed: {}", e);
                self.report(&e);
                Err(e.into())
            }
        }
    }

    fn report(&self, error: &MediaError) {
        self.status(&format!("Error: {}", error));
        if error.is_blocking() {
            self.emit(ClientEvent::Notice {
                message: format!("Camera error: {}", error),
            });
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.inner.events.send(event);
    }

    fn status(&self, status: &str) {
        self.emit(ClientEvent::StatusChanged {
            status: status.to_string(),
        });
    }
}

impl std::fmt::Debug for CaptureClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureClient")
            .field("destination", &self.inner.destination)
            .field("capturing", &self.is_capturing())
            .field("controller", &self.inner.controller)
            .finish()
    }
}

impl std::fmt::Debug for CaptureClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureClientBuilder")
            .field("config", &self.config)
            .field("encoder", &self.encoder.name())
            .finish()
    }
}
