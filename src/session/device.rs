//! Device fingerprinting from the client user-agent.
//!
//! One browser or app install maps to one rotating refresh-token slot. The
//! fingerprint is a heuristic: two real devices sending the byte-identical
//! user-agent string share a slot and evict each other on login.

use sha2::{Digest, Sha256};

/// Derive a stable device id from a raw user-agent string.
///
/// Deterministic across process restarts; same input, same id.
#[must_use]
pub fn device_id(user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.as_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .take(8)
        .fold(String::with_capacity(16), |mut acc, byte| {
            use std::fmt::Write;
            let _ = write!(acc, "{byte:02x}");
            acc
        })
}

/// Best-effort platform name for the login audit record.
#[must_use]
pub fn platform(user_agent: &str) -> Option<&'static str> {
    let ua = user_agent.to_lowercase();
    if ua.contains("android") {
        Some("android")
    } else if ua.contains("iphone") || ua.contains("ipad") {
        Some("ios")
    } else if ua.contains("windows") {
        Some("windows")
    } else if ua.contains("mac os") || ua.contains("macintosh") {
        Some("macos")
    } else if ua.contains("linux") {
        Some("linux")
    } else {
        None
    }
}

/// Best-effort browser name for the login audit record.
#[must_use]
pub fn browser(user_agent: &str) -> Option<&'static str> {
    let ua = user_agent.to_lowercase();
    // Order matters: Edge and Opera embed "chrome", Chrome embeds "safari".
    if ua.contains("edg/") || ua.contains("edge") {
        Some("edge")
    } else if ua.contains("opr/") || ua.contains("opera") {
        Some("opera")
    } else if ua.contains("chrome") {
        Some("chrome")
    } else if ua.contains("firefox") {
        Some("firefox")
    } else if ua.contains("safari") {
        Some("safari")
    } else if ua.contains("curl") {
        Some("curl")
    } else {
        None
    }
}
