//! Trait abstractions for device operations.
//!
//! Services depend on these traits rather than on [`SonosClientImpl`], so
//! routing and topology logic can be tested against in-memory fakes.
//!
//! [`SonosClientImpl`]: super::client::SonosClientImpl

use async_trait::async_trait;

use crate::sonos::discovery::{DiscoveredDevice, DiscoveryResult};
use crate::sonos::soap::SoapResult;
use crate::sonos::types::{PositionInfo, TransportInfo};
use crate::sonos::zone_groups::{TopologyResult, ZoneGroupEntry};

/// Transport control. Every call must be addressed to a group coordinator.
#[async_trait]
pub trait SonosPlayback: Send + Sync {
    async fn play(&self, coordinator_ip: &str) -> SoapResult<()>;

    async fn pause(&self, coordinator_ip: &str) -> SoapResult<()>;

    async fn stop(&self, coordinator_ip: &str) -> SoapResult<()>;

    async fn next(&self, coordinator_ip: &str) -> SoapResult<()>;

    async fn previous(&self, coordinator_ip: &str) -> SoapResult<()>;

    async fn get_transport_info(&self, ip: &str) -> SoapResult<TransportInfo>;

    /// Current track URI and decoded metadata.
    async fn get_position_info(&self, ip: &str) -> SoapResult<PositionInfo>;

    /// URI the transport is bound to (`GetMediaInfo`), used to classify
    /// the source.
    async fn get_media_uri(&self, ip: &str) -> SoapResult<Option<String>>;
}

/// Group membership changes.
#[async_trait]
pub trait SonosGrouping: Send + Sync {
    /// Makes the device at `ip` follow `coordinator_id`.
    async fn join_group(&self, ip: &str, coordinator_id: &str) -> SoapResult<()>;

    /// Makes the device at `ip` a standalone group.
    async fn leave_group(&self, ip: &str) -> SoapResult<()>;
}

/// Group-state document retrieval.
#[async_trait]
pub trait SonosTopology: Send + Sync {
    async fn get_zone_groups(&self, ip: &str) -> TopologyResult<Vec<ZoneGroupEntry>>;
}

/// Device discovery.
#[async_trait]
pub trait SonosDiscovery: Send + Sync {
    async fn discover_devices(&self) -> DiscoveryResult<Vec<DiscoveredDevice>>;
}

/// Volume and mute control.
///
/// Group calls go to the coordinator; speaker calls go to the addressed
/// device.
#[async_trait]
pub trait SonosVolumeControl: Send + Sync {
    async fn get_group_volume(&self, coordinator_ip: &str) -> SoapResult<u8>;

    async fn set_group_volume(&self, coordinator_ip: &str, volume: u8) -> SoapResult<()>;

    /// Adjusts group volume by `delta`, returning the resulting level.
    async fn set_relative_group_volume(&self, coordinator_ip: &str, delta: i8) -> SoapResult<u8>;

    /// Re-captures member volume ratios before a group volume change.
    async fn snapshot_group_volume(&self, coordinator_ip: &str) -> SoapResult<()>;

    async fn get_group_mute(&self, coordinator_ip: &str) -> SoapResult<bool>;

    async fn set_group_mute(&self, coordinator_ip: &str, mute: bool) -> SoapResult<()>;

    async fn get_speaker_volume(&self, speaker_ip: &str) -> SoapResult<u8>;

    async fn set_speaker_volume(&self, speaker_ip: &str, volume: u8) -> SoapResult<()>;

    async fn get_speaker_mute(&self, speaker_ip: &str) -> SoapResult<bool>;

    async fn set_speaker_mute(&self, speaker_ip: &str, mute: bool) -> SoapResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Combined Traits (for trait objects)
// ─────────────────────────────────────────────────────────────────────────────

/// What the topology monitor needs.
pub trait SonosTopologyClient: SonosDiscovery + SonosTopology {}

impl<T: SonosDiscovery + SonosTopology> SonosTopologyClient for T {}

/// What the command router needs.
pub trait SonosControl: SonosPlayback + SonosGrouping + SonosVolumeControl {}

impl<T: SonosPlayback + SonosGrouping + SonosVolumeControl> SonosControl for T {}

/// Every device operation.
pub trait SonosClient: SonosTopologyClient + SonosControl {}

impl<T: SonosTopologyClient + SonosControl> SonosClient for T {}
