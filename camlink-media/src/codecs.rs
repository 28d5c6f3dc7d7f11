//! Frame encoding
//!
//! Frames leave the client as JPEG stills wrapped in a `data:` URL, one text
//! message per frame. Encoding runs on the blocking pool so the pipeline task
//! keeps ticking while a frame is compressed.

use crate::error::{MediaError, MediaResult};
use crate::negotiate::Resolution;
use crate::raster::RasterBuffer;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

/// Prefix of every transmitted frame
pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Compressed frame ready for transport
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// JPEG bytes
    pub data: Bytes,
    /// Frame size
    pub size: Resolution,
}

impl EncodedFrame {
    /// Text form sent over the link
    pub fn to_data_url(&self) -> String {
        jpeg_data_url(&self.data)
    }
}

/// Wrap JPEG bytes in a base64 `data:` URL.
pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    let mut text = String::with_capacity(JPEG_DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    text.push_str(JPEG_DATA_URL_PREFIX);
    STANDARD.encode_string(jpeg, &mut text);
    text
}

/// Recover the JPEG bytes from a frame message.
pub fn decode_data_url(text: &str) -> MediaResult<Vec<u8>> {
    let payload = text
        .strip_prefix(JPEG_DATA_URL_PREFIX)
        .ok_or_else(|| MediaError::EncodingFailed {
            codec: "jpeg".to_string(),
            reason: "missing data URL prefix".to_string(),
        })?;
    STANDARD
        .decode(payload)
        .map_err(|e| MediaError::EncodingFailed {
            codec: "jpeg".to_string(),
            reason: e.to_string(),
        })
}

/// Map a 0..=1 quality factor onto the 1..=100 JPEG scale.
pub fn quality_percent(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8
}

/// Asynchronous still-image encoder
///
/// The raster is moved in and handed back with the result so the caller can
/// reuse its allocation for the next frame.
#[async_trait]
pub trait FrameEncoder: Send + Sync {
    /// Codec name
    fn name(&self) -> &str;

    /// Encode `raster` at `quality` (0..=1).
    async fn encode(
        &self,
        raster: RasterBuffer,
        quality: f32,
    ) -> (RasterBuffer, MediaResult<EncodedFrame>);
}

/// JPEG encoder backed by the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegFrameEncoder;

impl JpegFrameEncoder {
    /// Create the encoder
    pub fn new() -> Self {
        Self
    }

    /// Encode synchronously.
    pub fn encode_sync(raster: &RasterBuffer, quality: f32) -> MediaResult<EncodedFrame> {
        raster.validate()?;
        let size = raster.size();

        let mut out = Vec::with_capacity(raster.pixels().len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality_percent(quality))
            .encode(raster.pixels(), size.width, size.height, ColorType::Rgb8)
            .map_err(|e| MediaError::EncodingFailed {
                codec: "jpeg".to_string(),
                reason: e.to_string(),
            })?;

        Ok(EncodedFrame {
            data: Bytes::from(out),
            size,
        })
    }
}

#[async_trait]
impl FrameEncoder for JpegFrameEncoder {
    fn name(&self) -> &str {
        "jpeg"
    }

    async fn encode(
        &self,
        raster: RasterBuffer,
        quality: f32,
    ) -> (RasterBuffer, MediaResult<EncodedFrame>) {
        let joined = tokio::task::spawn_blocking(move || {
            let result = Self::encode_sync(&raster, quality);
            (raster, result)
        })
        .await;

        match joined {
            Ok(pair) => pair,
            Err(e) => (
                RasterBuffer::new(),
                Err(MediaError::EncodingFailed {
                    codec: "jpeg".to_string(),
                    reason: format!("encoder task failed: {}", e),
                }),
            ),
        }
    }
}
