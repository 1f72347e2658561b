//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (SSDP, UPnP, GENA) or
//! by the speakers' firmware and changing them would break protocol compliance.
//! Tunable values live in [`Config`](crate::state::Config).

// ─────────────────────────────────────────────────────────────────────────────
// SSDP (Simple Service Discovery Protocol)
// ─────────────────────────────────────────────────────────────────────────────

/// SSDP multicast group address.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// SSDP port.
pub const SSDP_PORT: u16 = 1900;

/// Search target for zone players.
pub const SSDP_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:ZonePlayer:1";

/// Maximum size of a single SSDP datagram we will read.
pub const SSDP_RECV_BUFFER_SIZE: usize = 2048;

// ─────────────────────────────────────────────────────────────────────────────
// Device HTTP endpoints
// ─────────────────────────────────────────────────────────────────────────────

/// Port every zone player listens on for control, eventing and descriptors.
pub const DEVICE_HTTP_PORT: u16 = 1400;

/// Path of the device descriptor document.
pub const DEVICE_DESCRIPTION_PATH: &str = "/xml/device_description.xml";

/// Maximum volume accepted by the rendering control services.
pub const MAX_VOLUME: u8 = 100;

// ─────────────────────────────────────────────────────────────────────────────
// GENA (UPnP General Event Notification Architecture)
// ─────────────────────────────────────────────────────────────────────────────

/// GENA subscription timeout requested from speaker (seconds).
///
/// Speakers may grant a shorter duration; the granted value is authoritative.
pub const GENA_SUBSCRIPTION_TIMEOUT_SECS: u64 = 3600;

/// Fallback duration when a speaker omits or garbles the TIMEOUT header.
pub const GENA_DEFAULT_GRANTED_SECS: u64 = 1800;

/// Fraction of the granted duration after which a subscription is renewed.
pub const GENA_RENEWAL_FRACTION: f64 = 0.8;

/// Path the callback listener serves NOTIFY requests on.
pub const GENA_CALLBACK_PATH: &str = "/gena";

/// Maximum size of GENA notification body (bytes).
pub const MAX_GENA_BODY_SIZE: usize = 64 * 1024;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP/SOAP
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for SOAP HTTP requests (seconds).
///
/// 10 seconds is reasonable for LAN operations.
pub const SOAP_TIMEOUT_SECS: u64 = 10;

/// Timeout for GENA SUBSCRIBE/UNSUBSCRIBE requests (seconds).
pub const GENA_REQUEST_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Topology
// ─────────────────────────────────────────────────────────────────────────────

/// Re-reads of the group state after a grouping command before giving up
/// and leaving it to the next topology event.
pub const GROUPING_CONFIRM_ATTEMPTS: u32 = 4;

/// Pause between those re-reads (milliseconds).
pub const GROUPING_CONFIRM_INTERVAL_MS: u64 = 250;

/// Delay before re-resolving after devices reported an unusable group
/// state (seconds).
pub const TOPOLOGY_RETRY_DELAY_SECS: u64 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the broadcast channel feeding external collaborators.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the internal GENA event channel.
pub const GENA_EVENT_CHANNEL_CAPACITY: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service name reported by the listener's health endpoint.
pub const APP_NAME: &str = "sonovol";
