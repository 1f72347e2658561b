//! GENA event XML parsing.
//!
//! Pure functions over NOTIFY bodies. AVTransport and RenderingControl wrap
//! their state in an escaped `LastChange` document; GroupRenderingControl
//! sends plain properties; ZoneGroupTopology carries the same group-state
//! document as `GetZoneGroupState`.

use crate::sonos::didl::parse_didl_lite;
use crate::sonos::types::{TrackMetadata, TransportState};
use crate::sonos::xml::{extract_val_attrs, extract_xml_text};
use crate::sonos::zone_groups::{
    extract_zone_group_state, parse_zone_group_state, TopologyResult, ZoneGroupEntry,
};

/// Parsed data from an AVTransport NOTIFY.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AvTransportData {
    pub transport_state: Option<TransportState>,
    /// `CurrentTrackURI`: the item being played.
    pub current_track_uri: Option<String>,
    /// `AVTransportURI`: the source the transport is bound to.
    pub av_transport_uri: Option<String>,
    /// Decoded `CurrentTrackMetaData`, when the event carried it.
    pub track: Option<TrackMetadata>,
}

impl AvTransportData {
    /// URI used to classify the source: the transport binding when known,
    /// otherwise the current track.
    #[must_use]
    pub fn source_uri(&self) -> Option<&str> {
        self.av_transport_uri
            .as_deref()
            .or(self.current_track_uri.as_deref())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transport_state.is_none()
            && self.current_track_uri.is_none()
            && self.av_transport_uri.is_none()
            && self.track.is_none()
    }
}

/// Volume/mute pair from RenderingControl or GroupRenderingControl.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RenderingData {
    pub volume: Option<u8>,
    pub muted: Option<bool>,
}

/// Returns the `LastChange` document with one level of entities decoded.
fn last_change(body: &str) -> Option<String> {
    extract_xml_text(body, "LastChange").filter(|s| !s.trim().is_empty())
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

fn parse_volume(value: &str) -> Option<u8> {
    value.trim().parse::<u16>().ok().map(|v| v.min(100) as u8)
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "True")
}

/// Parses an AVTransport NOTIFY body.
///
/// `device_ip` absolutizes artwork paths in the track metadata.
#[must_use]
pub fn parse_av_transport(body: &str, device_ip: &str) -> AvTransportData {
    let Some(document) = last_change(body) else {
        return AvTransportData::default();
    };

    let attrs = extract_val_attrs(
        &document,
        &[
            "TransportState",
            "CurrentTrackURI",
            "AVTransportURI",
            "CurrentTrackMetaData",
        ],
    );

    AvTransportData {
        transport_state: attrs
            .get("TransportState")
            .and_then(|v| v.trim().parse().ok()),
        current_track_uri: non_empty(attrs.get("CurrentTrackURI")),
        av_transport_uri: non_empty(attrs.get("AVTransportURI")),
        track: attrs
            .get("CurrentTrackMetaData")
            .map(|didl| parse_didl_lite(didl, device_ip))
            .filter(|t| !t.is_empty()),
    }
}

/// Parses a RenderingControl NOTIFY body (Master channel only).
#[must_use]
pub fn parse_rendering_control(body: &str) -> RenderingData {
    let Some(document) = last_change(body) else {
        return RenderingData::default();
    };
    let attrs = extract_val_attrs(&document, &["Volume", "Mute"]);
    RenderingData {
        volume: attrs.get("Volume").and_then(|v| parse_volume(v)),
        muted: attrs.get("Mute").map(|v| parse_flag(v)),
    }
}

/// Parses a GroupRenderingControl NOTIFY body.
#[must_use]
pub fn parse_group_rendering_control(body: &str) -> RenderingData {
    RenderingData {
        volume: extract_xml_text(body, "GroupVolume").and_then(|v| parse_volume(&v)),
        muted: extract_xml_text(body, "GroupMute").map(|v| parse_flag(&v)),
    }
}

/// Parses a ZoneGroupTopology NOTIFY body into group entries.
///
/// # Errors
/// Returns `Malformed` when the document is missing or not well formed.
pub fn parse_zone_group_topology(body: &str) -> TopologyResult<Vec<ZoneGroupEntry>> {
    let document = extract_zone_group_state(body)?;
    parse_zone_group_state(&document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sonos::test_fixtures::*;

    #[test]
    fn escaped_transport_state_decodes_to_playing() {
        let data = parse_av_transport(AV_TRANSPORT_NOTIFY_PLAYING, "192.168.1.10");
        assert_eq!(data.transport_state, Some(TransportState::Playing));
        assert_eq!(
            data.current_track_uri.as_deref(),
            Some("x-sonos-spotify:spotify%3atrack%3a123?sid=9&flags=8224&sn=1")
        );
    }

    #[test]
    fn track_metadata_is_decoded_from_nested_didl() {
        let data = parse_av_transport(AV_TRANSPORT_NOTIFY_PLAYING, "192.168.1.10");
        let track = data.track.expect("track metadata");
        assert_eq!(track.title.as_deref(), Some("Windowlicker"));
        assert_eq!(track.artist.as_deref(), Some("Aphex Twin"));
        assert_eq!(
            track.art_url.as_deref(),
            Some("http://192.168.1.10:1400/getaa?s=1&u=x-sonos-spotify")
        );
    }

    #[test]
    fn line_in_uses_transport_binding_as_source() {
        let data = parse_av_transport(AV_TRANSPORT_NOTIFY_LINE_IN, "192.168.1.10");
        assert_eq!(
            data.source_uri(),
            Some("x-rincon-stream:RINCON_AAAA00000000001400")
        );
    }

    #[test]
    fn missing_last_change_yields_nothing() {
        assert!(parse_av_transport("<e:propertyset/>", "192.168.1.10").is_empty());
    }

    #[test]
    fn rendering_control_reads_master_channel() {
        let data = parse_rendering_control(RENDERING_CONTROL_NOTIFY_FULL);
        assert_eq!(data.volume, Some(42));
        assert_eq!(data.muted, Some(false));

        let data = parse_rendering_control(RENDERING_CONTROL_NOTIFY_MUTED);
        assert_eq!(data.volume, Some(75));
        assert_eq!(data.muted, Some(true));
    }

    #[test]
    fn rendering_control_volume_only() {
        let data = parse_rendering_control(RENDERING_CONTROL_NOTIFY_VOLUME_ONLY);
        assert_eq!(data.volume, Some(100));
        assert_eq!(data.muted, None);
    }

    #[test]
    fn group_rendering_control_reads_properties() {
        let data = parse_group_rendering_control(GROUP_RENDERING_NOTIFY);
        assert_eq!(data.volume, Some(30));
        assert_eq!(data.muted, Some(true));
    }

    #[test]
    fn zone_group_topology_uses_topology_parser() {
        let groups = parse_zone_group_topology(ZONE_GROUP_TOPOLOGY_NOTIFY).expect("groups");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].coordinator_id, "RINCON_K1400");
        assert!(parse_zone_group_topology("<e:propertyset/>").is_err());
    }
}
