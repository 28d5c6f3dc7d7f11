//! Negotiation Demo
//!
//! Shows the picker options and selections produced for a few camera
//! capability reports and previous selections.
//!
//! Run with: cargo run --example negotiation_demo

use camlink::{reconcile, HardwareCapability, Resolution};
use tracing::{info, Level};

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("🎛️  camlink Capability Negotiation Demo");

    let cases = [
        ("720p webcam", HardwareCapability::new(1280, 720, 30), 60, Resolution::FHD),
        ("1080p webcam", HardwareCapability::new(1920, 1080, 60), 30, Resolution::FHD),
        ("phone, 4K sensor", HardwareCapability::new(4032, 3024, 30), 24, Resolution::UHD),
        ("unreported limits", HardwareCapability::default(), 30, Resolution::HD),
    ];

    for (name, caps, fps, resolution) in cases {
        let negotiated = reconcile(&caps, fps, resolution);
        info!("");
        info!("📷 {} (previous {} @ {} fps)", name, resolution, fps);
        for option in &negotiated.fps.options {
            let marker = if option.value == negotiated.chosen_fps() { "▶" } else { " " };
            info!("   {} {}", marker, option.label);
        }
        for option in &negotiated.resolution.options {
            let marker = if option.value == negotiated.chosen_resolution() {
                "▶"
            } else {
                " "
            };
            info!("   {} {}", marker, option.label);
        }
    }
}
