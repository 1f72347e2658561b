//! GENA event building functions.
//!
//! Turns parsed NOTIFY data into typed [`SonosEvent`]s tagged with the
//! originating device, then rewrites satellite identities to their visible
//! partner.

use crate::sonos::gena::SonosEvent;
use crate::sonos::gena_parser::{
    parse_av_transport, parse_group_rendering_control, parse_rendering_control,
    parse_zone_group_topology,
};
use crate::sonos::services::SonosService;
use crate::sonos::types::TopologySnapshot;
use crate::utils::now_millis;

/// Builds events from an AVTransport notification.
pub fn build_av_transport_events(device_id: &str, device_ip: &str, body: &str) -> Vec<SonosEvent> {
    let data = parse_av_transport(body, device_ip);
    if data.is_empty() {
        return Vec::new();
    }
    vec![SonosEvent::TransportChanged {
        device_id: device_id.to_string(),
        transport_state: data.transport_state,
        uri: data.source_uri().map(str::to_string),
        track: data.track,
        timestamp: now_millis(),
    }]
}

/// Builds events from a RenderingControl notification.
pub fn build_rendering_control_events(device_id: &str, body: &str) -> Vec<SonosEvent> {
    let timestamp = now_millis();
    let data = parse_rendering_control(body);
    let mut events = Vec::new();

    if let Some(volume) = data.volume {
        events.push(SonosEvent::SpeakerVolume {
            device_id: device_id.to_string(),
            volume,
            timestamp,
        });
    }
    if let Some(muted) = data.muted {
        events.push(SonosEvent::SpeakerMute {
            device_id: device_id.to_string(),
            muted,
            timestamp,
        });
    }
    events
}

/// Builds events from a GroupRenderingControl notification.
pub fn build_group_rendering_events(device_id: &str, body: &str) -> Vec<SonosEvent> {
    let timestamp = now_millis();
    let data = parse_group_rendering_control(body);
    let mut events = Vec::new();

    if let Some(volume) = data.volume {
        events.push(SonosEvent::GroupVolume {
            device_id: device_id.to_string(),
            volume,
            timestamp,
        });
    }
    if let Some(muted) = data.muted {
        events.push(SonosEvent::GroupMute {
            device_id: device_id.to_string(),
            muted,
            timestamp,
        });
    }
    events
}

/// Builds events from a ZoneGroupTopology notification.
///
/// A malformed document is logged and dropped; the last good snapshot stays.
pub fn build_zone_group_events(device_id: &str, body: &str) -> Vec<SonosEvent> {
    match parse_zone_group_topology(body) {
        Ok(groups) => vec![SonosEvent::ZoneGroupsUpdated {
            groups,
            timestamp: now_millis(),
        }],
        Err(e) => {
            log::warn!("[GENA] Ignoring topology notification from {}: {}", device_id, e);
            Vec::new()
        }
    }
}

/// Dispatches on the service that produced the notification.
pub fn build_events(
    service: SonosService,
    device_id: &str,
    device_ip: &str,
    body: &str,
) -> Vec<SonosEvent> {
    match service {
        SonosService::AVTransport => build_av_transport_events(device_id, device_ip, body),
        SonosService::RenderingControl => build_rendering_control_events(device_id, body),
        SonosService::GroupRenderingControl => build_group_rendering_events(device_id, body),
        SonosService::ZoneGroupTopology => build_zone_group_events(device_id, body),
    }
}

/// Rewrites every event's device id through the satellite -> visible map.
/// Ids with no mapping pass through unchanged.
pub fn remap_to_visible(events: Vec<SonosEvent>, snapshot: &TopologySnapshot) -> Vec<SonosEvent> {
    events
        .into_iter()
        .map(|mut event| {
            if let Some(id) = event.device_id_mut() {
                if let Some(visible) = snapshot.satellites.get(id.as_str()) {
                    *id = visible.clone();
                }
            }
            event
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sonos::test_fixtures::*;
    use crate::sonos::types::TransportState;

    #[test]
    fn av_transport_event_is_tagged_with_device() {
        let events = build_events(
            SonosService::AVTransport,
            "RINCON_K1400",
            "192.168.1.20",
            AV_TRANSPORT_NOTIFY_PLAYING,
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            SonosEvent::TransportChanged {
                device_id,
                transport_state,
                track,
                ..
            } => {
                assert_eq!(device_id, "RINCON_K1400");
                assert_eq!(*transport_state, Some(TransportState::Playing));
                assert!(track.is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn rendering_control_produces_volume_and_mute() {
        let events = build_events(
            SonosService::RenderingControl,
            "RINCON_K1400",
            "192.168.1.20",
            RENDERING_CONTROL_NOTIFY_MUTED,
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SonosEvent::SpeakerVolume { volume: 75, .. }));
        assert!(matches!(events[1], SonosEvent::SpeakerMute { muted: true, .. }));
    }

    #[test]
    fn malformed_topology_notification_is_dropped() {
        let events = build_events(
            SonosService::ZoneGroupTopology,
            "RINCON_K1400",
            "192.168.1.20",
            "<e:propertyset><e:property><ZoneGroupState>&lt;ZoneGroups&gt;&lt;ZoneGroup</ZoneGroupState></e:property></e:propertyset>",
        );
        assert!(events.is_empty());
    }

    #[test]
    fn satellite_events_are_remapped_to_visible_partner() {
        let groups = parse_zone_group_topology(ZONE_GROUP_TOPOLOGY_NOTIFY).expect("groups");
        let snapshot = crate::sonos::zone_groups::build_snapshot(&groups).expect("snapshot");

        let events = build_events(
            SonosService::RenderingControl,
            "RINCON_S1400",
            "192.168.1.31",
            RENDERING_CONTROL_NOTIFY_FULL,
        );
        let remapped = remap_to_visible(events, &snapshot);
        assert!(remapped
            .iter()
            .all(|e| e.device_id() == Some("RINCON_V1400")));

        let events = build_events(
            SonosService::RenderingControl,
            "RINCON_UNKNOWN",
            "192.168.1.99",
            RENDERING_CONTROL_NOTIFY_FULL,
        );
        let passed = remap_to_visible(events, &snapshot);
        assert!(passed
            .iter()
            .all(|e| e.device_id() == Some("RINCON_UNKNOWN")));
    }
}
