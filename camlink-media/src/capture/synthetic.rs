//! Synthetic camera backend
//!
//! Produces a moving test pattern instead of real camera frames. Used by the
//! demos, the tests and headless hosts. The backend keeps call counters so
//! callers can check that streams are released before new ones are acquired.

use super::{CaptureStream, DeviceKind, MediaBackend, MediaDeviceInfo};
use crate::constraints::CaptureConstraints;
use crate::error::{MediaError, MediaResult};
use crate::negotiate::{HardwareCapability, Resolution};
use crate::raster::RasterBuffer;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Size granted for unconstrained requests
const UNCONSTRAINED_SIZE: Resolution = Resolution::SD;

/// Synthetic backend configuration
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Devices reported by enumeration
    pub devices: Vec<MediaDeviceInfo>,
    /// Capability ceiling reported by every stream
    pub capability: HardwareCapability,
    /// Whether camera access is granted
    pub permission_granted: bool,
    /// Time between stream start and the first available frame
    pub warmup: Duration,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            devices: vec![
                MediaDeviceInfo::video_input("synthetic-0", "Synthetic Camera"),
                MediaDeviceInfo {
                    device_id: "synthetic-mic".to_string(),
                    kind: DeviceKind::AudioInput,
                    label: "Synthetic Microphone".to_string(),
                },
            ],
            capability: HardwareCapability::new(1920, 1080, 60),
            permission_granted: true,
            warmup: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicUsize,
    stopped: AtomicUsize,
    live: AtomicUsize,
    overlapping: AtomicUsize,
}

#[derive(Debug)]
struct BackendState {
    config: RwLock<SyntheticConfig>,
    counters: Counters,
    next_failure: Mutex<Option<String>>,
    next_enumeration_failure: Mutex<Option<String>>,
    last_constraints: Mutex<Option<CaptureConstraints>>,
}

/// Backend that serves synthetic test-pattern streams
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    state: Arc<BackendState>,
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

impl SyntheticBackend {
    /// Create a backend with the given configuration
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            state: Arc::new(BackendState {
                config: RwLock::new(config),
                counters: Counters::default(),
                next_failure: Mutex::new(None),
                next_enumeration_failure: Mutex::new(None),
                last_constraints: Mutex::new(None),
            }),
        }
    }

    /// Grant or revoke camera access.
    pub fn set_permission(&self, granted: bool) {
        self.state.config.write().permission_granted = granted;
    }

    /// Change the capability ceiling reported by new streams.
    pub fn set_capability(&self, capability: HardwareCapability) {
        self.state.config.write().capability = capability;
    }

    /// Make the next stream request fail with `reason`.
    pub fn fail_next_request(&self, reason: impl Into<String>) {
        *self.state.next_failure.lock() = Some(reason.into());
    }

    /// Make the next device enumeration fail with `reason`.
    pub fn fail_next_enumeration(&self, reason: impl Into<String>) {
        *self.state.next_enumeration_failure.lock() = Some(reason.into());
    }

    /// Streams granted so far (including permission probes)
    pub fn acquire_count(&self) -> usize {
        self.state.counters.acquired.load(Ordering::Acquire)
    }

    /// Streams stopped so far
    pub fn stop_count(&self) -> usize {
        self.state.counters.stopped.load(Ordering::Acquire)
    }

    /// Streams currently live
    pub fn live_count(&self) -> usize {
        self.state.counters.live.load(Ordering::Acquire)
    }

    /// Requests that arrived while another stream was still live
    pub fn overlapping_acquires(&self) -> usize {
        self.state.counters.overlapping.load(Ordering::Acquire)
    }

    /// Constraints of the most recent request
    pub fn last_constraints(&self) -> Option<CaptureConstraints> {
        self.state.last_constraints.lock().clone()
    }

    fn granted_size(constraints: &CaptureConstraints, limit: Resolution) -> Resolution {
        let (Some(width), Some(height)) = (constraints.width, constraints.height) else {
            return UNCONSTRAINED_SIZE;
        };
        let long_limit = limit.larger_dimension();
        let short_limit = limit.width.min(limit.height);
        if width.ideal >= height.ideal {
            Resolution::new(width.ideal.min(long_limit), height.ideal.min(short_limit))
        } else {
            Resolution::new(width.ideal.min(short_limit), height.ideal.min(long_limit))
        }
    }
}

#[async_trait]
impl MediaBackend for SyntheticBackend {
    async fn request_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> MediaResult<Box<dyn CaptureStream>> {
        *self.state.last_constraints.lock() = Some(constraints.clone());

        let config = self.state.config.read().clone();
        if !config.permission_granted {
            return Err(MediaError::PermissionDenied {
                reason: "NotAllowedError: Permission denied".to_string(),
            });
        }
        if let Some(reason) = self.state.next_failure.lock().take() {
            return Err(MediaError::Capture { reason });
        }

        let cameras: Vec<&MediaDeviceInfo> = config
            .devices
            .iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .collect();
        let device = match &constraints.device_id {
            Some(exact) => cameras
                .iter()
                .find(|d| d.device_id == exact.exact)
                .ok_or_else(|| MediaError::Capture {
                    reason: format!("OverconstrainedError: no device {}", exact.exact),
                })?,
            None => cameras.first().ok_or(MediaError::Capture {
                reason: "NotFoundError: Requested device not found".to_string(),
            })?,
        };

        let limit = config.capability.resolution_limit();
        let size = Self::granted_size(constraints, limit);
        let frame_rate = constraints
            .frame_rate
            .map(|range| range.max.min(config.capability.frame_rate_limit()))
            .unwrap_or_else(|| config.capability.frame_rate_limit());

        let counters = &self.state.counters;
        if counters.live.fetch_add(1, Ordering::AcqRel) > 0 {
            counters.overlapping.fetch_add(1, Ordering::AcqRel);
        }
        counters.acquired.fetch_add(1, Ordering::AcqRel);

        debug!(
            "Synthetic stream on {} at {} @ {} fps",
            device.device_id, size, frame_rate
        );

        Ok(Box::new(SyntheticStream {
            device_id: device.device_id.clone(),
            capability: config.capability,
            size,
            ready_at: Instant::now() + config.warmup,
            frame_index: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            backend: self.state.clone(),
        }))
    }

    async fn enumerate_devices(&self) -> MediaResult<Vec<MediaDeviceInfo>> {
        if let Some(reason) = self.state.next_enumeration_failure.lock().take() {
            return Err(MediaError::Capture { reason });
        }
        let config = self.state.config.read();
        if !config.permission_granted {
            // Labels stay hidden until access is granted
            return Ok(config
                .devices
                .iter()
                .map(|d| MediaDeviceInfo {
                    label: String::new(),
                    ..d.clone()
                })
                .collect());
        }
        Ok(config.devices.clone())
    }
}

/// Stream produced by [`SyntheticBackend`]
#[derive(Debug)]
struct SyntheticStream {
    device_id: String,
    capability: HardwareCapability,
    size: Resolution,
    ready_at: Instant,
    frame_index: AtomicU64,
    stopped: AtomicBool,
    backend: Arc<BackendState>,
}

impl CaptureStream for SyntheticStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn capabilities(&self) -> HardwareCapability {
        self.capability
    }

    fn video_size(&self) -> Option<Resolution> {
        if self.is_stopped() || Instant::now() < self.ready_at {
            return None;
        }
        Some(self.size)
    }

    fn draw_into(&self, raster: &mut RasterBuffer) -> MediaResult<()> {
        let size = self.video_size().ok_or(MediaError::CaptureNotActive)?;
        raster.ensure_size(size);

        let shift = self.frame_index.fetch_add(1, Ordering::Relaxed) as usize;
        let width = size.width.max(1) as usize;
        for (i, pixel) in raster.pixels_mut().chunks_exact_mut(3).enumerate() {
            let x = i % width;
            let y = i / width;
            pixel[0] = ((x + shift * 4) & 0xff) as u8;
            pixel[1] = ((y + shift * 2) & 0xff) as u8;
            pixel[2] = (((x ^ y) + shift) & 0xff) as u8;
        }
        Ok(())
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            let counters = &self.backend.counters;
            counters.live.fetch_sub(1, Ordering::AcqRel);
            counters.stopped.fetch_add(1, Ordering::AcqRel);
            debug!("Synthetic stream on {} stopped", self.device_id);
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop();
    }
}
