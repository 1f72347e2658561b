//! Event system for state-change consumers.
//!
//! This module provides:
//! - [`EventEmitter`] trait for services to emit events
//! - [`BroadcastEventBridge`] fanning events out over a broadcast channel
//! - Event types per category (device notifications, topology, controller)
//!
//! The `SonosEvent` type is defined in [`crate::sonos::gena`] and re-exported here.

mod bridge;
pub(crate) mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

pub use crate::sonos::gena::SonosEvent;

use serde::Serialize;

use crate::sonos::types::{NowPlaying, TopologySnapshot};

/// Events broadcast to consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Raw device notifications (already remapped to visible devices).
    Sonos(SonosEvent),

    /// Topology snapshot replaced.
    Topology(TopologyEvent),

    /// Controller state changes.
    Controller(ControllerEvent),
}

/// Topology changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TopologyEvent {
    /// A new snapshot was installed.
    Updated {
        snapshot: TopologySnapshot,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Discovery finished without finding any device.
    NoDevicesFound {
        timestamp: u64,
    },
    /// Devices answered with a group state that could not be installed;
    /// the previous snapshot stays and a new resolution is scheduled.
    Rejected {
        reason: String,
        timestamp: u64,
    },
}

/// Changes to the controller's cached state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ControllerEvent {
    /// The selected device changed (or was cleared).
    SelectionChanged {
        #[serde(skip_serializing_if = "Option::is_none")]
        device_id: Option<String>,
        timestamp: u64,
    },
    /// Last known volume of a device.
    VolumeChanged {
        device_id: String,
        volume: u8,
        /// True when this is the group volume reported by the coordinator.
        group: bool,
        timestamp: u64,
    },
    /// Last known mute of a device.
    MuteChanged {
        device_id: String,
        muted: bool,
        group: bool,
        timestamp: u64,
    },
    /// Now-playing info of a coordinator was overwritten.
    NowPlayingChanged {
        coordinator_id: String,
        now_playing: NowPlaying,
        timestamp: u64,
    },
    /// A command failed in a way the user should hear about.
    Error {
        code: &'static str,
        message: String,
        timestamp: u64,
    },
}

impl From<SonosEvent> for BroadcastEvent {
    fn from(event: SonosEvent) -> Self {
        Self::Sonos(event)
    }
}

impl From<TopologyEvent> for BroadcastEvent {
    fn from(event: TopologyEvent) -> Self {
        Self::Topology(event)
    }
}

impl From<ControllerEvent> for BroadcastEvent {
    fn from(event: ControllerEvent) -> Self {
        Self::Controller(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_category_and_type() {
        let event: BroadcastEvent = ControllerEvent::VolumeChanged {
            device_id: "RINCON_K1400".into(),
            volume: 30,
            group: true,
            timestamp: 1,
        }
        .into();
        let json = serde_json::to_value(&event).expect("json");
        assert_eq!(json["category"], "controller");
        assert_eq!(json["type"], "volumeChanged");
        assert_eq!(json["deviceId"], "RINCON_K1400");
    }

    #[test]
    fn sonos_events_use_camel_case_fields() {
        let event: BroadcastEvent = SonosEvent::GroupMute {
            device_id: "RINCON_K1400".into(),
            muted: true,
            timestamp: 1,
        }
        .into();
        let json = serde_json::to_value(&event).expect("json");
        assert_eq!(json["category"], "sonos");
        assert_eq!(json["type"], "groupMute");
        assert_eq!(json["deviceId"], "RINCON_K1400");
    }
}
