//! General utilities shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Extracts the identity token from a UDN or USN.
///
/// The token is the segment after the last `:` once any `::urn:...` suffix
/// has been cut, so `uuid:RINCON_000E58A0123401400` and
/// `uuid:RINCON_000E58A0123401400::urn:schemas-upnp-org:device:ZonePlayer:1`
/// both yield `RINCON_000E58A0123401400`.
#[must_use]
pub fn identity_token(udn: &str) -> String {
    let head = udn.split("::").next().unwrap_or(udn).trim();
    head.rsplit(':').next().unwrap_or(head).to_string()
}

/// Clamps a signed volume computation into the 0-100 range.
#[must_use]
pub fn clamp_volume(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_token_strips_prefix_and_suffix() {
        assert_eq!(identity_token("uuid:RINCON_ABC1400"), "RINCON_ABC1400");
        assert_eq!(
            identity_token("uuid:RINCON_ABC1400::urn:schemas-upnp-org:device:ZonePlayer:1"),
            "RINCON_ABC1400"
        );
        assert_eq!(identity_token("RINCON_ABC1400"), "RINCON_ABC1400");
    }

    #[test]
    fn clamp_volume_bounds() {
        assert_eq!(clamp_volume(-5), 0);
        assert_eq!(clamp_volume(42), 42);
        assert_eq!(clamp_volume(105), 100);
    }
}
