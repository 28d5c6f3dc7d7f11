//! Off-screen RGB raster that frames are drawn into before encoding

use crate::error::{MediaError, MediaResult};
use crate::negotiate::Resolution;

/// Bytes per pixel of the packed RGB layout
pub const BYTES_PER_PIXEL: usize = 3;

/// Reusable RGB8 pixel buffer
///
/// The backing storage is only reallocated when the frame size changes, so
/// steady-state streaming draws into the same allocation every tick.
#[derive(Debug, Default)]
pub struct RasterBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
    reallocations: u64,
}

impl RasterBuffer {
    /// Empty buffer; sized on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize to `size`. Returns `true` when the storage was reallocated.
    pub fn ensure_size(&mut self, size: Resolution) -> bool {
        if self.width == size.width && self.height == size.height && !self.data.is_empty() {
            return false;
        }
        self.width = size.width;
        self.height = size.height;
        self.data = vec![0; Self::byte_len(size)];
        self.reallocations += 1;
        true
    }

    fn byte_len(size: Resolution) -> usize {
        size.width as usize * size.height as usize * BYTES_PER_PIXEL
    }

    /// Current size
    pub fn size(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Packed RGB pixels, row-major
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel access for drawing
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of times storage has been (re)allocated
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Check that the pixel data matches the advertised size.
    pub fn validate(&self) -> MediaResult<()> {
        let expected = Self::byte_len(self.size());
        if expected == 0 || self.data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}
