//! Capability negotiation
//!
//! Maps the raw capability range a live capture reports onto the curated
//! frame-rate and resolution choices offered to the user, keeping the previous
//! selection whenever the hardware still supports it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame rates offered when the hardware allows them
pub const REFERENCE_FRAME_RATES: [u32; 5] = [15, 24, 30, 60, 120];

/// Frame rate chosen when the previous one is no longer available
pub const PREFERRED_FRAME_RATE: u32 = 30;

/// Width preferred when the previous resolution is no longer available
pub const PREFERRED_WIDTH: u32 = 1920;

/// Smallest hardware width that is offered as its own option
pub const MIN_CUSTOM_WIDTH: u32 = 640;

const DEFAULT_MAX_WIDTH: u32 = 3840;
const DEFAULT_MAX_HEIGHT: u32 = 2160;
const DEFAULT_MAX_FRAME_RATE: u32 = 60;

/// Label given to the hardware maximum when it is not on the ladder
pub const DEVICE_LIMIT_LABEL: &str = "Max Device Limit";

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Resolution {
    /// Create a resolution
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 640x480
    pub const SD: Self = Self::new(640, 480);
    /// 1280x720
    pub const HD: Self = Self::new(1280, 720);
    /// 1920x1080
    pub const FHD: Self = Self::new(1920, 1080);
    /// 2560x1440
    pub const QHD: Self = Self::new(2560, 1440);
    /// 3840x2160
    pub const UHD: Self = Self::new(3840, 2160);

    /// The larger of width and height
    pub fn larger_dimension(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Ladder label, or the device-limit label for off-ladder sizes
    pub fn label(&self) -> &'static str {
        REFERENCE_LADDER
            .iter()
            .find(|(res, _)| res == self)
            .map(|(_, label)| *label)
            .unwrap_or(DEVICE_LIMIT_LABEL)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Reference resolutions, ascending by width
pub const REFERENCE_LADDER: [(Resolution, &str); 5] = [
    (Resolution::SD, "SD"),
    (Resolution::HD, "HD"),
    (Resolution::FHD, "FHD"),
    (Resolution::QHD, "2K"),
    (Resolution::UHD, "4K"),
];

/// Capability range reported by a live capture
///
/// Platforms may omit any of the ranges; missing values fall back to
/// 3840x2160 at 60 fps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareCapability {
    /// Largest supported width
    pub max_width: Option<u32>,
    /// Largest supported height
    pub max_height: Option<u32>,
    /// Largest supported frame rate
    pub max_frame_rate: Option<u32>,
}

impl HardwareCapability {
    /// Capability with every range reported
    pub fn new(max_width: u32, max_height: u32, max_frame_rate: u32) -> Self {
        Self {
            max_width: Some(max_width),
            max_height: Some(max_height),
            max_frame_rate: Some(max_frame_rate),
        }
    }

    fn reported_frame_rate(&self) -> Option<u32> {
        self.max_frame_rate.filter(|fps| *fps > 0)
    }

    /// Frame-rate ceiling with the default applied
    pub fn frame_rate_limit(&self) -> u32 {
        self.reported_frame_rate().unwrap_or(DEFAULT_MAX_FRAME_RATE)
    }

    /// Resolution ceiling with defaults applied
    pub fn resolution_limit(&self) -> Resolution {
        Resolution::new(
            self.max_width.filter(|w| *w > 0).unwrap_or(DEFAULT_MAX_WIDTH),
            self.max_height.filter(|h| *h > 0).unwrap_or(DEFAULT_MAX_HEIGHT),
        )
    }
}

/// One entry of a picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickerOption<T> {
    /// Selectable value
    pub value: T,
    /// Human-readable text
    pub label: String,
}

/// Ordered picker entries together with the selected value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionSet<T> {
    /// Offered entries in display order
    pub options: Vec<PickerOption<T>>,
    /// Currently selected value; always one of `options`
    pub selected: T,
}

impl<T: Copy + PartialEq> OptionSet<T> {
    /// Whether `value` is offered
    pub fn contains(&self, value: &T) -> bool {
        self.options.iter().any(|o| o.value == *value)
    }

    /// Offered values in display order
    pub fn values(&self) -> Vec<T> {
        self.options.iter().map(|o| o.value).collect()
    }
}

/// Result of one negotiation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Negotiated {
    /// Frame-rate picker
    pub fps: OptionSet<u32>,
    /// Resolution picker
    pub resolution: OptionSet<Resolution>,
}

impl Negotiated {
    /// Chosen frame rate
    pub fn chosen_fps(&self) -> u32 {
        self.fps.selected
    }

    /// Chosen resolution
    pub fn chosen_resolution(&self) -> Resolution {
        self.resolution.selected
    }
}

/// Reconcile hardware capability with the previous selection.
pub fn reconcile(
    caps: &HardwareCapability,
    previous_fps: u32,
    previous_resolution: Resolution,
) -> Negotiated {
    Negotiated {
        fps: frame_rate_options(caps, previous_fps),
        resolution: resolution_options(caps, previous_resolution),
    }
}

fn frame_rate_options(caps: &HardwareCapability, previous: u32) -> OptionSet<u32> {
    let limit = caps.frame_rate_limit();
    let mut rates: Vec<u32> = REFERENCE_FRAME_RATES
        .iter()
        .copied()
        .filter(|fps| *fps <= limit)
        .collect();

    if let Some(reported) = caps.reported_frame_rate() {
        if !rates.contains(&reported) {
            rates.push(reported);
        }
    }

    let selected = if rates.contains(&previous) {
        previous
    } else if rates.contains(&PREFERRED_FRAME_RATE) {
        PREFERRED_FRAME_RATE
    } else {
        // Never empty: the reported or default ceiling is always present
        rates.iter().copied().max().unwrap_or(PREFERRED_FRAME_RATE)
    };

    OptionSet {
        options: rates
            .into_iter()
            .map(|fps| PickerOption {
                value: fps,
                label: format!("{} FPS", fps),
            })
            .collect(),
        selected,
    }
}

fn resolution_options(caps: &HardwareCapability, previous: Resolution) -> OptionSet<Resolution> {
    let limit = caps.resolution_limit();
    let max_dimension = limit.larger_dimension();

    let mut sizes: Vec<(Resolution, &'static str)> = REFERENCE_LADDER
        .iter()
        .copied()
        .filter(|(res, _)| res.larger_dimension() <= max_dimension)
        .collect();

    if !sizes.iter().any(|(res, _)| *res == limit) && limit.width >= MIN_CUSTOM_WIDTH {
        sizes.push((limit, DEVICE_LIMIT_LABEL));
        sizes.sort_by_key(|(res, _)| res.width);
    }

    if sizes.is_empty() {
        sizes.push(REFERENCE_LADDER[1]);
    }

    let selected = if sizes.iter().any(|(res, _)| *res == previous) {
        previous
    } else {
        sizes
            .iter()
            .find(|(res, _)| res.width == PREFERRED_WIDTH)
            .or_else(|| sizes.last())
            .map(|(res, _)| *res)
            .unwrap_or(Resolution::HD)
    };

    OptionSet {
        options: sizes
            .into_iter()
            .map(|(res, label)| PickerOption {
                value: res,
                label: format!("{} ({})", res, label),
            })
            .collect(),
        selected,
    }
}
