//! Volume and mute control.
//!
//! Two addressing scopes share the same request shapes:
//! - group scope (GroupRenderingControl), always sent to the coordinator,
//!   which spreads changes across members proportionally;
//! - speaker scope (RenderingControl), sent to the addressed device and
//!   qualified with the `Master` channel.

use reqwest::Client;

use crate::protocol_constants::MAX_VOLUME;
use crate::sonos::services::SonosService;
use crate::sonos::soap::{
    bool_arg, parse_bool_field, parse_volume_field, SoapRequestBuilder, SoapResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Group,
    Speaker,
}

impl Scope {
    fn service(self) -> SonosService {
        match self {
            Self::Group => SonosService::GroupRenderingControl,
            Self::Speaker => SonosService::RenderingControl,
        }
    }

    fn action(self, verb: &'static str) -> &'static str {
        match (self, verb) {
            (Self::Group, "GetVolume") => "GetGroupVolume",
            (Self::Group, "SetVolume") => "SetGroupVolume",
            (Self::Group, "GetMute") => "GetGroupMute",
            (Self::Group, "SetMute") => "SetGroupMute",
            (_, verb) => verb,
        }
    }

    fn request<'a>(self, client: &'a Client, ip: &'a str, verb: &'static str) -> SoapRequestBuilder<'a> {
        let builder = SoapRequestBuilder::new(client, ip)
            .service(self.service())
            .action(self.action(verb))
            .instance_id();
        match self {
            Self::Group => builder,
            Self::Speaker => builder.master_channel(),
        }
    }
}

async fn read_volume(client: &Client, ip: &str, scope: Scope) -> SoapResult<u8> {
    let response = scope.request(client, ip, "GetVolume").send().await?;
    parse_volume_field(&response, "CurrentVolume")
}

async fn write_volume(client: &Client, ip: &str, scope: Scope, volume: u8) -> SoapResult<()> {
    scope
        .request(client, ip, "SetVolume")
        .arg("DesiredVolume", volume.min(MAX_VOLUME).to_string())
        .send()
        .await
        .map(drop)
}

async fn read_mute(client: &Client, ip: &str, scope: Scope) -> SoapResult<bool> {
    let response = scope.request(client, ip, "GetMute").send().await?;
    parse_bool_field(&response, "CurrentMute")
}

async fn write_mute(client: &Client, ip: &str, scope: Scope, mute: bool) -> SoapResult<()> {
    scope
        .request(client, ip, "SetMute")
        .arg("DesiredMute", bool_arg(mute))
        .send()
        .await
        .map(drop)
}

// ─────────────────────────────────────────────────────────────────────────────
// Group scope
// ─────────────────────────────────────────────────────────────────────────────

/// Group volume (0-100) as reported by the coordinator.
pub async fn get_group_volume(client: &Client, coordinator_ip: &str) -> SoapResult<u8> {
    read_volume(client, coordinator_ip, Scope::Group).await
}

/// Sets the group volume; values above 100 are clamped.
pub async fn set_group_volume(client: &Client, coordinator_ip: &str, volume: u8) -> SoapResult<()> {
    write_volume(client, coordinator_ip, Scope::Group, volume).await
}

/// Moves the group volume by `delta` and returns the level the coordinator
/// settled on.
pub async fn set_relative_group_volume(
    client: &Client,
    coordinator_ip: &str,
    delta: i8,
) -> SoapResult<u8> {
    let response = Scope::Group
        .request(client, coordinator_ip, "SetRelativeGroupVolume")
        .arg("Adjustment", delta.to_string())
        .send()
        .await?;
    parse_volume_field(&response, "NewVolume")
}

/// Re-captures member ratios after membership changes.
pub async fn snapshot_group_volume(client: &Client, coordinator_ip: &str) -> SoapResult<()> {
    Scope::Group
        .request(client, coordinator_ip, "SnapshotGroupVolume")
        .send()
        .await
        .map(drop)
}

pub async fn get_group_mute(client: &Client, coordinator_ip: &str) -> SoapResult<bool> {
    read_mute(client, coordinator_ip, Scope::Group).await
}

pub async fn set_group_mute(client: &Client, coordinator_ip: &str, mute: bool) -> SoapResult<()> {
    write_mute(client, coordinator_ip, Scope::Group, mute).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Speaker scope
// ─────────────────────────────────────────────────────────────────────────────

pub async fn get_speaker_volume(client: &Client, speaker_ip: &str) -> SoapResult<u8> {
    read_volume(client, speaker_ip, Scope::Speaker).await
}

/// Sets one speaker's own volume; values above 100 are clamped.
pub async fn set_speaker_volume(client: &Client, speaker_ip: &str, volume: u8) -> SoapResult<()> {
    write_volume(client, speaker_ip, Scope::Speaker, volume).await
}

pub async fn get_speaker_mute(client: &Client, speaker_ip: &str) -> SoapResult<bool> {
    read_mute(client, speaker_ip, Scope::Speaker).await
}

pub async fn set_speaker_mute(client: &Client, speaker_ip: &str, mute: bool) -> SoapResult<()> {
    write_mute(client, speaker_ip, Scope::Speaker, mute).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_scope_renames_actions_and_skips_channel() {
        let client = Client::new();
        let (service, action, args) = Scope::Group
            .request(&client, "192.168.1.100", "SetVolume")
            .arg("DesiredVolume", 150u8.min(MAX_VOLUME).to_string())
            .into_parts()
            .expect("parts");

        assert_eq!(service, SonosService::GroupRenderingControl);
        assert_eq!(action, "SetGroupVolume");
        assert_eq!(args.len(), 2);
        assert_eq!(args[1], ("DesiredVolume", "100".to_string()));
    }

    #[test]
    fn speaker_scope_targets_master_channel() {
        let client = Client::new();
        let (service, action, args) = Scope::Speaker
            .request(&client, "192.168.1.100", "GetMute")
            .into_parts()
            .expect("parts");

        assert_eq!(service, SonosService::RenderingControl);
        assert_eq!(action, "GetMute");
        assert_eq!(args[1], ("Channel", "Master".to_string()));
    }

    #[test]
    fn non_volume_actions_keep_their_names() {
        assert_eq!(
            Scope::Group.action("SnapshotGroupVolume"),
            "SnapshotGroupVolume"
        );
        assert_eq!(Scope::Speaker.action("SetVolume"), "SetVolume");
    }

    #[test]
    fn volume_responses_parse() {
        let group = r#"<s:Envelope><s:Body><u:GetGroupVolumeResponse xmlns:u="urn:schemas-upnp-org:service:GroupRenderingControl:1"><CurrentVolume>37</CurrentVolume></u:GetGroupVolumeResponse></s:Body></s:Envelope>"#;
        assert_eq!(parse_volume_field(group, "CurrentVolume").expect("volume"), 37);

        let relative = r#"<s:Envelope><s:Body><u:SetRelativeGroupVolumeResponse><NewVolume>42</NewVolume></u:SetRelativeGroupVolumeResponse></s:Body></s:Envelope>"#;
        assert_eq!(parse_volume_field(relative, "NewVolume").expect("volume"), 42);
    }
}
