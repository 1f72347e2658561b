//! Transport control: play, pause, track skipping and transport queries.
//!
//! All AVTransport actions act on the group as a whole and must be sent to
//! the group coordinator.

use reqwest::Client;

use crate::sonos::didl::parse_didl_lite;
use crate::sonos::services::SonosService;
use crate::sonos::soap::{require_field, SoapError, SoapRequestBuilder, SoapResult};
use crate::sonos::types::{PositionInfo, TransportInfo, TransportState};
use crate::sonos::xml::extract_xml_text;

/// Sends a parameterless AVTransport action (InstanceID only).
async fn transport_action(client: &Client, ip: &str, action: &str) -> SoapResult<()> {
    SoapRequestBuilder::new(client, ip)
        .service(SonosService::AVTransport)
        .action(action)
        .instance_id()
        .send()
        .await?;
    Ok(())
}

/// Starts or resumes playback.
pub async fn play(client: &Client, coordinator_ip: &str) -> SoapResult<()> {
    SoapRequestBuilder::new(client, coordinator_ip)
        .service(SonosService::AVTransport)
        .action("Play")
        .instance_id()
        .arg("Speed", "1")
        .send()
        .await?;
    Ok(())
}

pub async fn pause(client: &Client, coordinator_ip: &str) -> SoapResult<()> {
    transport_action(client, coordinator_ip, "Pause").await
}

pub async fn stop(client: &Client, coordinator_ip: &str) -> SoapResult<()> {
    transport_action(client, coordinator_ip, "Stop").await
}

pub async fn next(client: &Client, coordinator_ip: &str) -> SoapResult<()> {
    transport_action(client, coordinator_ip, "Next").await
}

pub async fn previous(client: &Client, coordinator_ip: &str) -> SoapResult<()> {
    transport_action(client, coordinator_ip, "Previous").await
}

/// Sets the transport URI (and optional DIDL-Lite metadata) of a device.
pub async fn set_av_transport_uri(
    client: &Client,
    ip: &str,
    uri: &str,
    metadata: &str,
) -> SoapResult<()> {
    SoapRequestBuilder::new(client, ip)
        .service(SonosService::AVTransport)
        .action("SetAVTransportURI")
        .instance_id()
        .arg("CurrentURI", uri)
        .arg("CurrentURIMetaData", metadata)
        .send()
        .await?;
    Ok(())
}

/// Queries the current transport state.
pub async fn get_transport_info(client: &Client, coordinator_ip: &str) -> SoapResult<TransportInfo> {
    let response = SoapRequestBuilder::new(client, coordinator_ip)
        .service(SonosService::AVTransport)
        .action("GetTransportInfo")
        .instance_id()
        .send()
        .await?;

    parse_transport_info(&response)
}

/// Queries the current track URI and metadata.
pub async fn get_position_info(client: &Client, coordinator_ip: &str) -> SoapResult<PositionInfo> {
    let response = SoapRequestBuilder::new(client, coordinator_ip)
        .service(SonosService::AVTransport)
        .action("GetPositionInfo")
        .instance_id()
        .send()
        .await?;

    Ok(parse_position_info(&response, coordinator_ip))
}

/// Queries the media (source) URI currently loaded, which is what source
/// classification keys off. Returns `None` when nothing is loaded.
pub async fn get_media_uri(client: &Client, ip: &str) -> SoapResult<Option<String>> {
    let response = SoapRequestBuilder::new(client, ip)
        .service(SonosService::AVTransport)
        .action("GetMediaInfo")
        .instance_id()
        .send()
        .await?;

    Ok(extract_xml_text(&response, "CurrentURI").filter(|uri| !uri.is_empty()))
}

fn parse_transport_info(response: &str) -> SoapResult<TransportInfo> {
    let raw = require_field(response, "CurrentTransportState")?;
    let state: TransportState = raw
        .trim()
        .parse()
        .map_err(|_| SoapError::Parse(format!("unknown transport state: {}", raw)))?;
    Ok(TransportInfo { state })
}

fn parse_position_info(response: &str, ip: &str) -> PositionInfo {
    let track_uri = extract_xml_text(response, "TrackURI").filter(|u| !u.is_empty());
    let track = extract_xml_text(response, "TrackMetaData")
        .map(|didl| parse_didl_lite(&didl, ip))
        .unwrap_or_default();
    PositionInfo { track_uri, track }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transport_info() {
        let xml = r#"<s:Envelope><s:Body><u:GetTransportInfoResponse><CurrentTransportState>PAUSED_PLAYBACK</CurrentTransportState><CurrentTransportStatus>OK</CurrentTransportStatus><CurrentSpeed>1</CurrentSpeed></u:GetTransportInfoResponse></s:Body></s:Envelope>"#;
        assert_eq!(
            parse_transport_info(xml).unwrap().state,
            TransportState::Paused
        );
    }

    #[test]
    fn unknown_transport_state_is_parse_error() {
        let xml = "<r><CurrentTransportState>WARPING</CurrentTransportState></r>";
        assert!(matches!(parse_transport_info(xml), Err(SoapError::Parse(_))));
    }

    #[test]
    fn position_info_decodes_escaped_didl() {
        let xml = r#"<s:Envelope><s:Body><u:GetPositionInfoResponse><Track>1</Track><TrackMetaData>&lt;DIDL-Lite&gt;&lt;item&gt;&lt;dc:title&gt;Windowlicker&lt;/dc:title&gt;&lt;dc:creator&gt;Aphex Twin&lt;/dc:creator&gt;&lt;/item&gt;&lt;/DIDL-Lite&gt;</TrackMetaData><TrackURI>x-sonos-http:track.mp4</TrackURI></u:GetPositionInfoResponse></s:Body></s:Envelope>"#;
        let info = parse_position_info(xml, "10.0.0.5");
        assert_eq!(info.track_uri.as_deref(), Some("x-sonos-http:track.mp4"));
        assert_eq!(info.track.title.as_deref(), Some("Windowlicker"));
        assert_eq!(info.track.artist.as_deref(), Some("Aphex Twin"));
    }
}
