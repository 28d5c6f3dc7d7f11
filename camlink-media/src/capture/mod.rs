//! Platform media layer abstraction
//!
//! A [`MediaBackend`] is what the rest of the crate talks to when it needs a
//! camera: it grants capture streams for a constraint request and lists the
//! devices the platform knows about.

pub mod synthetic;

pub use synthetic::{SyntheticBackend, SyntheticConfig};

use crate::constraints::CaptureConstraints;
use crate::error::MediaResult;
use crate::negotiate::{HardwareCapability, Resolution};
use crate::raster::RasterBuffer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of media device reported by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Camera
    VideoInput,
    /// Microphone
    AudioInput,
    /// Speaker
    AudioOutput,
}

/// Raw device entry as the platform reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeviceInfo {
    /// Opaque device identifier
    pub device_id: String,
    /// Device kind
    pub kind: DeviceKind,
    /// Human-readable label; empty until permission is granted
    pub label: String,
}

impl MediaDeviceInfo {
    /// Camera entry
    pub fn video_input(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            kind: DeviceKind::VideoInput,
            label: label.into(),
        }
    }
}

/// Platform media layer
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Request a capture stream satisfying `constraints`.
    ///
    /// Fails with `PermissionDenied` when access is refused and `Capture`
    /// when the device is unavailable or the constraints cannot be met.
    async fn request_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> MediaResult<Box<dyn CaptureStream>>;

    /// List every media device the platform knows about.
    async fn enumerate_devices(&self) -> MediaResult<Vec<MediaDeviceInfo>>;
}

/// A live camera stream
pub trait CaptureStream: Send + Sync {
    /// Identifier of the device backing this stream
    fn device_id(&self) -> &str;

    /// Capability range of the video track
    fn capabilities(&self) -> HardwareCapability;

    /// Native size of the current frame, `None` until a frame is available
    fn video_size(&self) -> Option<Resolution>;

    /// Draw the current frame into `raster` at its native size.
    fn draw_into(&self, raster: &mut RasterBuffer) -> MediaResult<()>;

    /// Stop every track of the stream. Idempotent.
    fn stop(&self);

    /// Whether `stop` has been called
    fn is_stopped(&self) -> bool;
}
