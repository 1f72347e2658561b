//! Shared types for device discovery.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during discovery.
///
/// A discovery window that simply hears nothing is not an error; it yields an
/// empty list.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Failed to create or bind the UDP socket.
    #[error("failed to bind UDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// No usable network interfaces found.
    #[error("no usable network interfaces found")]
    NoInterfaces,
}

impl DiscoveryError {
    /// True when the OS refused the socket (sandboxing, firewall, missing
    /// local-network permission).
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::SocketBind(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
            Self::NoInterfaces => false,
        }
    }
}

/// Convenient Result alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// One reply to an M-SEARCH, before its descriptor has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpResponse {
    /// Source address of the reply.
    pub ip: String,
    /// `LOCATION` header: the descriptor URL.
    pub location: Option<String>,
    /// Identity token from the `USN` header, if present.
    pub usn_id: Option<String>,
}

/// A device found by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    /// Identity token (`RINCON_...`), the deduplication key.
    pub id: String,
    /// Room name, or the host when the descriptor could not be fetched.
    pub name: String,
    pub ip: String,
    pub model_name: Option<String>,
    /// False when the descriptor fetch failed and the name is a fallback.
    pub described: bool,
}

/// Interface name prefixes that never carry zone players.
pub const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vbox", "tun", "tap", "utun", "awdl",
];

/// Checks if an interface name belongs to a virtual/container interface.
pub fn is_virtual_interface(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name_lower.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_interfaces_are_detected() {
        assert!(is_virtual_interface("docker0"));
        assert!(is_virtual_interface("utun3"));
        assert!(!is_virtual_interface("en0"));
        assert!(!is_virtual_interface("wlan0"));
    }

    #[test]
    fn permission_denied_is_recognised() {
        let err = DiscoveryError::SocketBind(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied,
        ));
        assert!(err.is_permission_denied());
        assert!(!DiscoveryError::NoInterfaces.is_permission_denied());
    }
}
