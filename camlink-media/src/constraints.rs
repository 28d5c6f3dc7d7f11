//! Capture targets and the constraint requests built from them

use crate::error::MediaError;
use crate::negotiate::Resolution;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requested orientation of the captured picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Follow the device; treated like landscape when building constraints
    #[default]
    Auto,
    /// Taller than wide
    Portrait,
    /// Wider than tall
    Landscape,
}

impl FromStr for Orientation {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Orientation::Auto),
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => Err(MediaError::InvalidConfiguration {
                message: format!("Unknown orientation: {}", other),
            }),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Orientation::Auto => "auto",
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        })
    }
}

/// What the user asked the camera for
///
/// A single width/height pair describes both orientations; the orientation
/// decides which of the two becomes the ideal width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureTarget {
    /// Target width in pixels
    pub width: u32,
    /// Target height in pixels
    pub height: u32,
    /// Target frames per second
    pub frame_rate: u32,
    /// Requested orientation
    pub orientation: Orientation,
    /// Selected device, if any
    pub device_id: Option<String>,
}

impl Default for CaptureTarget {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: 30,
            orientation: Orientation::Auto,
            device_id: None,
        }
    }
}

impl CaptureTarget {
    /// Target resolution as configured (orientation not applied)
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Ideal `(width, height)` after applying the orientation policy.
    pub fn ideal_size(&self) -> (u32, u32) {
        let small = self.width.min(self.height);
        let large = self.width.max(self.height);
        match self.orientation {
            Orientation::Portrait => (small, large),
            Orientation::Landscape | Orientation::Auto => (large, small),
        }
    }

    /// Minimum spacing between sent frames in milliseconds
    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.frame_rate.max(1) as f64
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), MediaError> {
        if self.width == 0 || self.height == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "Invalid resolution".to_string(),
            });
        }
        if self.frame_rate == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "Invalid framerate".to_string(),
            });
        }
        Ok(())
    }
}

/// Constraint the platform may relax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ideal {
    /// Preferred value
    pub ideal: u32,
}

/// Frame-rate constraint with a preferred value and a hard ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRateRange {
    /// Preferred value
    pub ideal: u32,
    /// Upper bound the platform must respect
    pub max: u32,
}

/// Constraint the platform must satisfy or fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exact {
    /// Required value
    pub exact: String,
}

/// Camera facing preference used when no device is selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera
    User,
    /// Rear camera
    Environment,
}

/// Video constraint request handed to the platform media layer
///
/// Serializes in the shape browsers accept for `getUserMedia({ video })`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConstraints {
    /// Width preference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<Ideal>,
    /// Height preference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<Ideal>,
    /// Frame-rate preference and ceiling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<FrameRateRange>,
    /// Exact device selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<Exact>,
    /// Facing preference, only set when no device is selected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facing_mode: Option<FacingMode>,
}

impl CaptureConstraints {
    /// Unconstrained request, used only to unlock permission and labels
    pub fn any() -> Self {
        Self::default()
    }

    /// Build the request for a capture target.
    pub fn from_target(target: &CaptureTarget) -> Self {
        let (ideal_width, ideal_height) = target.ideal_size();
        let (device_id, facing_mode) = match &target.device_id {
            Some(id) => (Some(Exact { exact: id.clone() }), None),
            None => (None, Some(FacingMode::Environment)),
        };

        Self {
            width: Some(Ideal { ideal: ideal_width }),
            height: Some(Ideal {
                ideal: ideal_height,
            }),
            frame_rate: Some(FrameRateRange {
                ideal: target.frame_rate,
                max: target.frame_rate,
            }),
            device_id,
            facing_mode,
        }
    }
}
