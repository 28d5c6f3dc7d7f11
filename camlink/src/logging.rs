//! Log output setup for hosts and demos

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "camlink=info,camlink_core=info,camlink_media=info,camlink_receiver=info";

/// Install a formatted `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Returns `false` when a global
/// subscriber was already installed, which leaves that one in place.
pub fn init_logging(default_filter: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or(DEFAULT_LOG_FILTER)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
