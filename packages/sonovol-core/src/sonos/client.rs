//! Concrete device client.
//!
//! [`SonosClientImpl`] implements every trait in [`super::traits`] on top of
//! the free functions in `volume`, `playback`, `grouping` and `zone_groups`.
//! Reads are retried on transient failures; writes are sent exactly once.

use async_trait::async_trait;
use reqwest::Client;

use crate::sonos::discovery::{self, DiscoveredDevice, DiscoveryConfig, DiscoveryResult};
use crate::sonos::retry::with_retry;
use crate::sonos::services::SonosService;
use crate::sonos::soap::{send_soap_request, SoapResult};
use crate::sonos::traits::{
    SonosDiscovery, SonosGrouping, SonosPlayback, SonosTopology, SonosVolumeControl,
};
use crate::sonos::types::{PositionInfo, TransportInfo};
use crate::sonos::zone_groups::{self, TopologyResult, ZoneGroupEntry};
use crate::sonos::{grouping, playback, volume};

/// Concrete implementation of the device traits.
#[derive(Clone)]
pub struct SonosClientImpl {
    client: Client,
    discovery: DiscoveryConfig,
}

impl std::fmt::Debug for SonosClientImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonosClientImpl")
            .field("discovery", &self.discovery)
            .finish_non_exhaustive()
    }
}

impl SonosClientImpl {
    pub fn new(client: Client, discovery: DiscoveryConfig) -> Self {
        Self { client, discovery }
    }

    /// The underlying HTTP client.
    #[must_use]
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Sends an arbitrary action and returns the raw response body.
    ///
    /// # Errors
    /// Transport failure, SOAP fault or non-2xx status.
    pub async fn send(
        &self,
        service: SonosService,
        action: &str,
        args: &[(&str, &str)],
        ip: &str,
    ) -> SoapResult<String> {
        send_soap_request(&self.client, ip, service, action, args, None).await
    }
}

#[async_trait]
impl SonosPlayback for SonosClientImpl {
    async fn play(&self, coordinator_ip: &str) -> SoapResult<()> {
        playback::play(&self.client, coordinator_ip).await
    }

    async fn pause(&self, coordinator_ip: &str) -> SoapResult<()> {
        playback::pause(&self.client, coordinator_ip).await
    }

    async fn stop(&self, coordinator_ip: &str) -> SoapResult<()> {
        playback::stop(&self.client, coordinator_ip).await
    }

    async fn next(&self, coordinator_ip: &str) -> SoapResult<()> {
        playback::next(&self.client, coordinator_ip).await
    }

    async fn previous(&self, coordinator_ip: &str) -> SoapResult<()> {
        playback::previous(&self.client, coordinator_ip).await
    }

    async fn get_transport_info(&self, ip: &str) -> SoapResult<TransportInfo> {
        with_retry("GetTransportInfo", || playback::get_transport_info(&self.client, ip)).await
    }

    async fn get_position_info(&self, ip: &str) -> SoapResult<PositionInfo> {
        with_retry("GetPositionInfo", || playback::get_position_info(&self.client, ip)).await
    }

    async fn get_media_uri(&self, ip: &str) -> SoapResult<Option<String>> {
        with_retry("GetMediaInfo", || playback::get_media_uri(&self.client, ip)).await
    }
}

#[async_trait]
impl SonosGrouping for SonosClientImpl {
    async fn join_group(&self, ip: &str, coordinator_id: &str) -> SoapResult<()> {
        grouping::join_group(&self.client, ip, coordinator_id).await
    }

    async fn leave_group(&self, ip: &str) -> SoapResult<()> {
        grouping::leave_group(&self.client, ip).await
    }
}

#[async_trait]
impl SonosTopology for SonosClientImpl {
    async fn get_zone_groups(&self, ip: &str) -> TopologyResult<Vec<ZoneGroupEntry>> {
        zone_groups::get_zone_groups(&self.client, ip).await
    }
}

#[async_trait]
impl SonosDiscovery for SonosClientImpl {
    async fn discover_devices(&self) -> DiscoveryResult<Vec<DiscoveredDevice>> {
        discovery::discover(&self.client, &self.discovery).await
    }
}

#[async_trait]
impl SonosVolumeControl for SonosClientImpl {
    async fn get_group_volume(&self, coordinator_ip: &str) -> SoapResult<u8> {
        with_retry("GetGroupVolume", || {
            volume::get_group_volume(&self.client, coordinator_ip)
        })
        .await
    }

    async fn set_group_volume(&self, coordinator_ip: &str, level: u8) -> SoapResult<()> {
        volume::set_group_volume(&self.client, coordinator_ip, level).await
    }

    async fn set_relative_group_volume(&self, coordinator_ip: &str, delta: i8) -> SoapResult<u8> {
        volume::set_relative_group_volume(&self.client, coordinator_ip, delta).await
    }

    async fn snapshot_group_volume(&self, coordinator_ip: &str) -> SoapResult<()> {
        volume::snapshot_group_volume(&self.client, coordinator_ip).await
    }

    async fn get_group_mute(&self, coordinator_ip: &str) -> SoapResult<bool> {
        with_retry("GetGroupMute", || {
            volume::get_group_mute(&self.client, coordinator_ip)
        })
        .await
    }

    async fn set_group_mute(&self, coordinator_ip: &str, mute: bool) -> SoapResult<()> {
        volume::set_group_mute(&self.client, coordinator_ip, mute).await
    }

    async fn get_speaker_volume(&self, speaker_ip: &str) -> SoapResult<u8> {
        with_retry("GetVolume", || volume::get_speaker_volume(&self.client, speaker_ip)).await
    }

    async fn set_speaker_volume(&self, speaker_ip: &str, level: u8) -> SoapResult<()> {
        volume::set_speaker_volume(&self.client, speaker_ip, level).await
    }

    async fn get_speaker_mute(&self, speaker_ip: &str) -> SoapResult<bool> {
        with_retry("GetMute", || volume::get_speaker_mute(&self.client, speaker_ip)).await
    }

    async fn set_speaker_mute(&self, speaker_ip: &str, mute: bool) -> SoapResult<()> {
        volume::set_speaker_mute(&self.client, speaker_ip, mute).await
    }
}

