//! Domain types for devices, groups and topology snapshots.
//!
//! A [`TopologySnapshot`] is produced wholesale by one resolution pass and is
//! never mutated afterwards; consumers hold it behind an `Arc` and swap the
//! whole thing when a newer one arrives.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Transport State
// ─────────────────────────────────────────────────────────────────────────────

/// Playback transport state as reported by the AVTransport service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportState {
    Playing,
    #[serde(rename = "PAUSED_PLAYBACK")]
    Paused,
    Stopped,
    Transitioning,
    NoMediaPresent,
}

impl TransportState {
    /// True when audio is (about to be) coming out of the speaker.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Playing | Self::Transitioning)
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Playing => write!(f, "Playing"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Transitioning => write!(f, "Transitioning"),
            Self::NoMediaPresent => write!(f, "No media"),
        }
    }
}

/// Error returned when parsing an unknown transport state string.
#[derive(Debug, Clone, Error)]
#[error("unknown transport state")]
pub struct ParseTransportStateError;

impl std::str::FromStr for TransportState {
    type Err = ParseTransportStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLAYING" => Ok(Self::Playing),
            "PAUSED_PLAYBACK" | "PAUSED" => Ok(Self::Paused),
            "STOPPED" => Ok(Self::Stopped),
            "TRANSITIONING" => Ok(Self::Transitioning),
            "NO_MEDIA_PRESENT" => Ok(Self::NoMediaPresent),
            _ => Err(ParseTransportStateError),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Source classification
// ─────────────────────────────────────────────────────────────────────────────

/// What a coordinator is currently playing from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// Analog or digital line-in of this or another device.
    LineIn,
    /// Home-theater input (HDMI ARC / optical).
    Tv,
    /// Track-based streaming or local library.
    Streaming,
    /// Radio-style continuous stream.
    Radio,
    /// Nothing playing.
    Idle,
    /// This device follows another group's coordinator.
    Following,
}

impl SourceKind {
    /// Classifies a transport URI as reported by the device.
    ///
    /// Sources that are not actively playing classify as [`SourceKind::Idle`],
    /// except for group followers which always report [`SourceKind::Following`].
    #[must_use]
    pub fn classify(uri: Option<&str>, state: Option<TransportState>) -> Self {
        let uri = uri.unwrap_or("").trim();
        if uri.starts_with("x-rincon:") {
            return Self::Following;
        }
        let active = state.map(|s| s.is_active()).unwrap_or(false);
        if uri.is_empty() || !active {
            return Self::Idle;
        }
        if uri.starts_with("x-rincon-stream:") {
            Self::LineIn
        } else if uri.starts_with("x-sonos-htastream:") {
            Self::Tv
        } else if uri.starts_with("x-sonosapi-stream:")
            || uri.starts_with("x-sonosapi-radio:")
            || uri.starts_with("x-rincon-mp3radio:")
            || uri.starts_with("x-sonosapi-hls:")
            || uri.starts_with("aac:")
        {
            Self::Radio
        } else {
            Self::Streaming
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::LineIn => "line-in",
            Self::Tv => "TV",
            Self::Streaming => "streaming",
            Self::Radio => "radio",
            Self::Idle => "idle",
            Self::Following => "following",
        }
    }
}

/// Track information decoded from DIDL-Lite metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub art_url: Option<String>,
}

impl TrackMetadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none() && self.album.is_none()
    }
}

/// Now-playing information for one coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub source: SourceKind,
    pub transport_state: Option<TransportState>,
    pub uri: Option<String>,
    #[serde(flatten)]
    pub track: TrackMetadata,
}

impl Default for NowPlaying {
    fn default() -> Self {
        Self {
            source: SourceKind::Idle,
            transport_state: None,
            uri: None,
            track: TrackMetadata::default(),
        }
    }
}

/// Result of `GetTransportInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportInfo {
    pub state: TransportState,
}

/// Result of `GetPositionInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionInfo {
    pub track_uri: Option<String>,
    pub track: TrackMetadata,
}

// ─────────────────────────────────────────────────────────────────────────────
// Topology
// ─────────────────────────────────────────────────────────────────────────────

/// One device as seen in a topology snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Stable identity (`RINCON_...`).
    pub id: String,
    /// User-configured room name.
    pub name: String,
    /// Network address.
    pub ip: String,
    /// False for satellites hidden behind a visible partner.
    pub visible: bool,
    /// Bonded partner, if part of a stereo pair or home-theater set.
    pub paired_with: Option<String>,
    /// Group this device belongs to.
    pub group_id: String,
    /// Coordinator of that group.
    pub coordinator_id: String,
}

impl Device {
    #[must_use]
    pub fn is_coordinator(&self) -> bool {
        self.id == self.coordinator_id
    }
}

/// A playback group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    /// Room names joined coordinator-first.
    pub name: String,
    pub coordinator_id: String,
    /// All member ids, coordinator included, satellites included.
    pub member_ids: Vec<String>,
    /// What the coordinator plays from. Resolution leaves it `Idle`;
    /// [`ControllerState::classify_groups`](crate::services::ControllerState::classify_groups)
    /// fills it from cached now-playing info.
    pub source: SourceKind,
}

/// Full device and group set from one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologySnapshot {
    pub devices: Vec<Device>,
    pub groups: Vec<Group>,
    /// Invisible satellite id -> visible partner id.
    pub satellites: HashMap<String, String>,
    /// Millisecond timestamp of the resolution.
    pub resolved_at: u64,
}

impl TopologySnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    #[must_use]
    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// Finds a visible device by room name (case-insensitive).
    #[must_use]
    pub fn device_by_name(&self, name: &str) -> Option<&Device> {
        self.devices
            .iter()
            .find(|d| d.visible && d.name.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Current coordinator of the group containing `device_id`.
    #[must_use]
    pub fn coordinator_of(&self, device_id: &str) -> Option<&Device> {
        let device = self.device(device_id)?;
        self.device(&device.coordinator_id)
    }

    /// Maps a satellite to its visible partner; other ids pass through.
    #[must_use]
    pub fn resolve_visible<'a>(&'a self, id: &'a str) -> &'a str {
        self.satellites.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Selectable devices sorted by name.
    #[must_use]
    pub fn visible_devices(&self) -> Vec<&Device> {
        let mut devices: Vec<&Device> = self.devices.iter().filter(|d| d.visible).collect();
        devices.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        devices
    }

    /// Bonded pairs as (lower id, higher id), sorted.
    #[must_use]
    pub fn pairings(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .devices
            .iter()
            .filter_map(|d| {
                let partner = d.paired_with.as_ref()?;
                Some(if d.id <= *partner {
                    (d.id.clone(), partner.clone())
                } else {
                    (partner.clone(), d.id.clone())
                })
            })
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_state_parses_upnp_values() {
        assert_eq!("PLAYING".parse::<TransportState>().unwrap(), TransportState::Playing);
        assert_eq!(
            "PAUSED_PLAYBACK".parse::<TransportState>().unwrap(),
            TransportState::Paused
        );
        assert!("BOGUS".parse::<TransportState>().is_err());
    }

    #[test]
    fn classify_sources() {
        let playing = Some(TransportState::Playing);
        assert_eq!(
            SourceKind::classify(Some("x-rincon-stream:RINCON_1"), playing),
            SourceKind::LineIn
        );
        assert_eq!(
            SourceKind::classify(Some("x-sonos-htastream:RINCON_1:spdif"), playing),
            SourceKind::Tv
        );
        assert_eq!(
            SourceKind::classify(Some("x-sonosapi-stream:s1234?sid=254"), playing),
            SourceKind::Radio
        );
        assert_eq!(
            SourceKind::classify(Some("x-sonos-spotify:spotify%3atrack%3a1"), playing),
            SourceKind::Streaming
        );
        assert_eq!(
            SourceKind::classify(Some("x-rincon:RINCON_2"), playing),
            SourceKind::Following
        );
    }

    #[test]
    fn paused_source_is_idle() {
        assert_eq!(
            SourceKind::classify(
                Some("x-sonos-spotify:spotify%3atrack%3a1"),
                Some(TransportState::Paused)
            ),
            SourceKind::Idle
        );
        assert_eq!(SourceKind::classify(None, None), SourceKind::Idle);
    }

    fn device(id: &str, name: &str, visible: bool, paired: Option<&str>) -> Device {
        Device {
            id: id.into(),
            name: name.into(),
            ip: format!("10.0.0.{}", id.len()),
            visible,
            paired_with: paired.map(String::from),
            group_id: "G".into(),
            coordinator_id: "V".into(),
        }
    }

    #[test]
    fn resolve_visible_maps_satellites_only() {
        let snapshot = TopologySnapshot {
            devices: vec![
                device("V", "Living Room", true, Some("S")),
                device("S", "Living Room", false, Some("V")),
            ],
            groups: vec![],
            satellites: HashMap::from([("S".to_string(), "V".to_string())]),
            resolved_at: 0,
        };
        assert_eq!(snapshot.resolve_visible("S"), "V");
        assert_eq!(snapshot.resolve_visible("V"), "V");
        assert_eq!(snapshot.resolve_visible("UNKNOWN"), "UNKNOWN");
        assert_eq!(snapshot.pairings(), vec![("S".to_string(), "V".to_string())]);
        assert_eq!(snapshot.visible_devices().len(), 1);
    }
}
