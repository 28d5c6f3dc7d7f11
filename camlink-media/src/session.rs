//! Capture session management
//!
//! The session manager exclusively owns the live camera stream. It builds the
//! constraint request from the capture target, guarantees the previous stream
//! is fully stopped before a replacement is requested, and feeds the granted
//! capability back through the negotiator.

use crate::capture::{CaptureStream, MediaBackend};
use crate::constraints::{CaptureConstraints, CaptureTarget};
use crate::error::{MediaError, MediaResult};
use crate::negotiate::{reconcile, HardwareCapability, Negotiated, Resolution};
use crate::raster::RasterBuffer;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The live camera stream
pub struct CaptureHandle {
    stream: Box<dyn CaptureStream>,
    target: CaptureTarget,
}

impl CaptureHandle {
    fn new(stream: Box<dyn CaptureStream>, target: CaptureTarget) -> Self {
        Self { stream, target }
    }

    /// Device backing the stream
    pub fn device_id(&self) -> &str {
        self.stream.device_id()
    }

    /// Target the stream was requested with
    pub fn target(&self) -> &CaptureTarget {
        &self.target
    }

    /// Capability range reported by the stream
    pub fn capabilities(&self) -> HardwareCapability {
        self.stream.capabilities()
    }

    /// Native frame size, `None` until the first frame arrives
    pub fn video_size(&self) -> Option<Resolution> {
        self.stream.video_size()
    }

    /// Draw the current frame into `raster`.
    pub fn draw_into(&self, raster: &mut RasterBuffer) -> MediaResult<()> {
        self.stream.draw_into(raster)
    }

    /// Stop every track.
    pub fn stop(&self) {
        self.stream.stop();
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stream.stop();
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("device_id", &self.device_id())
            .field("target", &self.target)
            .finish()
    }
}

/// Shared view of the live handle; the pipeline reads it every tick
pub type CaptureSlot = Arc<RwLock<Option<CaptureHandle>>>;

/// Owns the one live capture handle
pub struct CaptureSessionManager {
    backend: Arc<dyn MediaBackend>,
    slot: CaptureSlot,
    negotiated: Option<Negotiated>,
}

impl CaptureSessionManager {
    /// Create a manager over `backend`
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            slot: Arc::new(RwLock::new(None)),
            negotiated: None,
        }
    }

    /// Shared slot holding the live handle
    pub fn slot(&self) -> CaptureSlot {
        self.slot.clone()
    }

    /// Whether a handle is live
    pub fn is_live(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Negotiation result for the live handle
    pub fn negotiated(&self) -> Option<&Negotiated> {
        self.negotiated.as_ref()
    }

    /// Tear down the live handle (if any) and acquire a new one for `target`.
    ///
    /// After a successful acquisition the granted capability is negotiated
    /// against the target; when the negotiator falls back, `target` is updated
    /// to the chosen values without requesting the stream again.
    pub async fn acquire(&mut self, target: &mut CaptureTarget) -> MediaResult<&Negotiated> {
        self.release();

        let constraints = CaptureConstraints::from_target(target);
        debug!("Requesting capture: {:?}", constraints);

        let stream = self
            .backend
            .request_stream(&constraints)
            .await
            .map_err(|e| match e {
                MediaError::Capture { .. } => e,
                other => MediaError::Capture {
                    reason: other.to_string(),
                },
            })?;

        let capability = stream.capabilities();
        let negotiated = reconcile(&capability, target.frame_rate, target.resolution());

        let chosen_fps = negotiated.chosen_fps();
        let chosen_resolution = negotiated.chosen_resolution();
        if chosen_fps != target.frame_rate || chosen_resolution != target.resolution() {
            info!(
                "Hardware limit: {}x{} @ {} -> {} @ {}",
                target.width, target.height, target.frame_rate, chosen_resolution, chosen_fps
            );
            target.frame_rate = chosen_fps;
            target.width = chosen_resolution.width;
            target.height = chosen_resolution.height;
        }

        info!(
            "Capture ready on {} ({:?})",
            stream.device_id(),
            target.orientation
        );
        *self.slot.write() = Some(CaptureHandle::new(stream, target.clone()));

        Ok(&*self.negotiated.insert(negotiated))
    }

    /// Stop and drop the live handle along with its negotiation result.
    pub fn release(&mut self) {
        self.negotiated = None;
        let previous = self.slot.write().take();
        if let Some(handle) = previous {
            handle.stop();
            debug!("Released capture on {}", handle.device_id());
        }
    }
}

impl Drop for CaptureSessionManager {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CaptureSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSessionManager")
            .field("live", &self.is_live())
            .field("negotiated", &self.negotiated)
            .finish()
    }
}

/// Collapses bursts of display-orientation events into one action
///
/// Each `trigger` restarts the settle delay; only the last trigger of a burst
/// runs its action.
#[derive(Debug)]
pub struct OrientationDebouncer {
    delay: Duration,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl OrientationDebouncer {
    /// Create a debouncer with the given settle delay
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    /// Settle delay
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` after the settle delay, superseding any earlier trigger.
    pub fn trigger<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let current = self.generation.clone();
        let delay = self.delay;

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::Acquire) != generation {
                return;
            }
            action().await;
        });

        // The superseded task would return early anyway; a running action is left alone
        if let Some(previous) = self.pending.lock().replace(task) {
            if !previous.is_finished() {
                debug!("Orientation change superseded");
            }
        }
    }

    /// Drop any scheduled action.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self.pending.lock().take() {
            if !task.is_finished() {
                warn!("Cancelled pending orientation reacquire");
            }
        }
    }
}
