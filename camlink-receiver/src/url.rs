//! Address the viewer advertises to capture clients

use std::net::IpAddr;

/// Host used when no LAN address can be determined
pub const FALLBACK_HOST: &str = "localhost";

/// URL capture clients should open to reach this receiver.
///
/// Uses the machine's primary LAN address and falls back to `localhost`.
pub fn stream_url(port: u16) -> String {
    stream_url_for(local_ip_address::local_ip().ok(), port)
}

/// Format the stream URL for a known (or unknown) host address.
pub fn stream_url_for(ip: Option<IpAddr>, port: u16) -> String {
    match ip {
        Some(IpAddr::V6(v6)) => format!("https://[{}]:{}", v6, port),
        Some(ip) => format!("https://{}:{}", ip, port),
        None => format!("https://{}:{}", FALLBACK_HOST, port),
    }
}
