//! Group-state document parsing and topology snapshot construction.
//!
//! `GetZoneGroupState` returns the group-state document entity-escaped inside
//! the SOAP response. It is decoded once, parsed with quick-xml into
//! [`ZoneGroupEntry`] values, and then turned into a validated
//! [`TopologySnapshot`] by [`build_snapshot`]. The same parser handles the
//! `ZoneGroupState` property of ZoneGroupTopology notifications.

use std::collections::{HashMap, HashSet};

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::sonos::services::SonosService;
use crate::sonos::soap::{SoapError, SoapRequestBuilder};
use crate::sonos::types::{Device, Group, SourceKind, TopologySnapshot};
use crate::sonos::xml::{extract_ip_from_location, extract_xml_text, get_xml_attr};
use crate::utils::now_millis;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors produced while resolving topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// None of the queried devices answered.
    #[error("no device answered the topology query: {0}")]
    Unreachable(String),

    /// The document could not be parsed or lacked the group-state element.
    #[error("malformed group-state document: {0}")]
    Malformed(String),

    /// The document parsed but violates a topology invariant.
    #[error("inconsistent topology: {0}")]
    Inconsistent(String),

    /// The query itself failed.
    #[error(transparent)]
    Soap(#[from] SoapError),
}

/// Convenient Result alias for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

// ─────────────────────────────────────────────────────────────────────────────
// Parsed document
// ─────────────────────────────────────────────────────────────────────────────

/// One `ZoneGroupMember` or `Satellite` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneGroupMember {
    pub id: String,
    pub ip: String,
    pub zone_name: String,
    pub invisible: bool,
    /// `ChannelMapSet` (stereo pair) or `HTSatChanMapSet` (home theater).
    pub channel_map: Option<String>,
}

/// One `ZoneGroup` element as declared by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneGroupEntry {
    pub id: String,
    pub coordinator_id: String,
    pub members: Vec<ZoneGroupMember>,
}

/// Total number of members across all groups.
#[must_use]
pub fn member_count(groups: &[ZoneGroupEntry]) -> usize {
    groups.iter().map(|g| g.members.len()).sum()
}

/// Parses the (already decoded) group-state document.
///
/// Zone bridges (`IsZoneBridge="1"`) cannot play audio and are skipped;
/// groups left without members are dropped. Members missing an identity or
/// a usable `Location` are skipped with a debug log.
///
/// # Errors
/// Returns [`TopologyError::Malformed`] if the document is not well formed.
pub fn parse_zone_group_state(xml: &str) -> TopologyResult<Vec<ZoneGroupEntry>> {
    let mut groups = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut current: Option<ZoneGroupEntry> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"ZoneGroup" => {
                    current = Some(ZoneGroupEntry {
                        id: get_xml_attr(&e, b"ID").unwrap_or_default(),
                        coordinator_id: get_xml_attr(&e, b"Coordinator").unwrap_or_default(),
                        members: Vec::new(),
                    });
                }
                b"ZoneGroupMember" | b"Satellite" => {
                    let Some(group) = current.as_mut() else {
                        continue;
                    };
                    if get_xml_attr(&e, b"IsZoneBridge").as_deref() == Some("1") {
                        continue;
                    }
                    let Some(id) = get_xml_attr(&e, b"UUID") else {
                        log::debug!("[Topology] Skipping member without UUID");
                        continue;
                    };
                    let Some(ip) = get_xml_attr(&e, b"Location")
                        .as_deref()
                        .and_then(extract_ip_from_location)
                    else {
                        log::debug!("[Topology] Skipping {} without usable Location", id);
                        continue;
                    };
                    let channel_map = get_xml_attr(&e, b"ChannelMapSet")
                        .or_else(|| get_xml_attr(&e, b"HTSatChanMapSet"))
                        .filter(|m| !m.is_empty());

                    group.members.push(ZoneGroupMember {
                        zone_name: get_xml_attr(&e, b"ZoneName").unwrap_or_else(|| ip.clone()),
                        invisible: get_xml_attr(&e, b"Invisible").as_deref() == Some("1"),
                        id,
                        ip,
                        channel_map,
                    });
                }
                _ => {}
            },
            Ok(Event::End(e)) if e.local_name().as_ref() == b"ZoneGroup" => {
                if let Some(group) = current.take() {
                    if !group.members.is_empty() {
                        groups.push(group);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(TopologyError::Malformed(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(groups)
}

/// Pulls the group-state document out of a SOAP response or NOTIFY body and
/// decodes it.
///
/// # Errors
/// Returns [`TopologyError::Malformed`] if the element is absent.
pub fn extract_zone_group_state(body: &str) -> TopologyResult<String> {
    extract_xml_text(body, "ZoneGroupState")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| TopologyError::Malformed("missing ZoneGroupState".into()))
}

/// Identities listed in a channel map such as
/// `RINCON_A:LF,LF;RINCON_B:RF,RF`.
#[must_use]
pub fn channel_map_ids(map: &str) -> Vec<&str> {
    map.split(';')
        .filter_map(|entry| entry.split(':').next())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot construction
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a validated snapshot from parsed groups.
///
/// Stereo partners and home-theater satellites are linked through their
/// channel maps; every invisible member linked to a visible one produces a
/// satellite -> visible entry.
///
/// # Errors
/// Returns [`TopologyError::Inconsistent`] when a coordinator is not a member
/// of its own group or a device appears in more than one group. Inconsistent
/// documents are never repaired.
pub fn build_snapshot(groups: &[ZoneGroupEntry]) -> TopologyResult<TopologySnapshot> {
    let mut seen: HashSet<&str> = HashSet::new();
    for group in groups {
        if !group.members.iter().any(|m| m.id == group.coordinator_id) {
            return Err(TopologyError::Inconsistent(format!(
                "group {} names coordinator {} which is not a member",
                group.id, group.coordinator_id
            )));
        }
        for member in &group.members {
            if !seen.insert(member.id.as_str()) {
                return Err(TopologyError::Inconsistent(format!(
                    "device {} appears in more than one group",
                    member.id
                )));
            }
        }
    }

    let invisible: HashMap<&str, bool> = groups
        .iter()
        .flat_map(|g| g.members.iter())
        .map(|m| (m.id.as_str(), m.invisible))
        .collect();

    let mut satellites: HashMap<String, String> = HashMap::new();
    let mut partners: HashMap<String, String> = HashMap::new();

    for member in groups.iter().flat_map(|g| g.members.iter()) {
        let Some(map) = member.channel_map.as_deref() else {
            continue;
        };
        let ids: Vec<&str> = channel_map_ids(map)
            .into_iter()
            .filter(|id| invisible.contains_key(id))
            .collect();
        let Some(visible) = ids.iter().copied().find(|id| invisible.get(id) == Some(&false))
        else {
            continue;
        };
        for id in ids.iter().copied().filter(|id| *id != visible) {
            if invisible.get(id) == Some(&true) {
                satellites.insert(id.to_string(), visible.to_string());
            }
            partners
                .entry(id.to_string())
                .or_insert_with(|| visible.to_string());
            partners
                .entry(visible.to_string())
                .or_insert_with(|| id.to_string());
        }
    }

    let mut devices = Vec::new();
    let mut out_groups = Vec::new();

    for group in groups {
        for member in &group.members {
            devices.push(Device {
                id: member.id.clone(),
                name: member.zone_name.clone(),
                ip: member.ip.clone(),
                visible: !member.invisible,
                paired_with: partners.get(&member.id).cloned(),
                group_id: group.id.clone(),
                coordinator_id: group.coordinator_id.clone(),
            });
        }
        out_groups.push(Group {
            id: group.id.clone(),
            name: group_display_name(group),
            coordinator_id: group.coordinator_id.clone(),
            member_ids: group.members.iter().map(|m| m.id.clone()).collect(),
            source: SourceKind::Idle,
        });
    }

    Ok(TopologySnapshot {
        devices,
        groups: out_groups,
        satellites,
        resolved_at: now_millis(),
    })
}

/// Combines unique room names, coordinator first.
fn group_display_name(group: &ZoneGroupEntry) -> String {
    let mut names: Vec<&str> = Vec::new();
    if let Some(coord) = group.members.iter().find(|m| m.id == group.coordinator_id) {
        names.push(&coord.zone_name);
    }
    for member in group.members.iter().filter(|m| !m.invisible) {
        if !names.contains(&member.zone_name.as_str()) {
            names.push(&member.zone_name);
        }
    }
    names.join(", ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Query
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches and parses the group-state document from one device.
pub async fn get_zone_groups(client: &Client, ip: &str) -> TopologyResult<Vec<ZoneGroupEntry>> {
    let response = SoapRequestBuilder::new(client, ip)
        .service(SonosService::ZoneGroupTopology)
        .action("GetZoneGroupState")
        .send()
        .await?;

    let document = extract_zone_group_state(&response)?;
    parse_zone_group_state(&document)
}
