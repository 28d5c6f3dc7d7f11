//! # camlink media
//!
//! Camera capture and frame streaming for camlink: device discovery,
//! negotiation of requested against granted capture parameters, the capture
//! session that owns the live camera, JPEG encoding, and the paced,
//! backpressure-aware pipeline that pushes frames over a [`camlink_core::FrameLink`].

#![warn(clippy::all)]

pub mod capture;
pub mod clock;
pub mod codecs;
pub mod constraints;
pub mod device;
pub mod error;
pub mod negotiate;
pub mod pipeline;
pub mod raster;
pub mod session;

// Re-export main types
pub use capture::{
    CaptureStream, DeviceKind, MediaBackend, MediaDeviceInfo, SyntheticBackend, SyntheticConfig,
};
pub use clock::{DisplayClock, FrameClock};
pub use codecs::{
    decode_data_url, jpeg_data_url, EncodedFrame, FrameEncoder, JpegFrameEncoder,
    JPEG_DATA_URL_PREFIX,
};
pub use constraints::{CaptureConstraints, CaptureTarget, FacingMode, Orientation};
pub use device::{DeviceDescriptor, DeviceEnumerator};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use negotiate::{reconcile, HardwareCapability, Negotiated, OptionSet, PickerOption, Resolution};
pub use pipeline::{
    EncodeCompletion, PipelineStats, SkipReason, StreamConfig, StreamingLoop, StreamingLoopState,
    StreamingPipeline, TickInput, TickOutcome, BACKPRESSURE_THRESHOLD,
};
pub use raster::RasterBuffer;
pub use session::{CaptureHandle, CaptureSessionManager, CaptureSlot, OrientationDebouncer};
