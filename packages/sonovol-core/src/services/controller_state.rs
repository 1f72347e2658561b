//! Controller state cache.
//!
//! Holds what the router knows between commands: the selected device, the
//! last known volume and mute of each device and group, and now-playing
//! info per coordinator. Every change is broadcast as a [`ControllerEvent`].

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;

use crate::events::{ControllerEvent, EventEmitter, SonosEvent};
use crate::sonos::types::{
    Device, Group, NowPlaying, SourceKind, TopologySnapshot, TrackMetadata, TransportState,
};
use crate::utils::now_millis;

/// Serializable copy of the whole state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub selected_device_id: Option<String>,
    pub last_selected_name: Option<String>,
    pub volumes: BTreeMap<String, u8>,
    pub mutes: BTreeMap<String, bool>,
    /// Keyed by coordinator id.
    pub group_volumes: BTreeMap<String, u8>,
    pub group_mutes: BTreeMap<String, bool>,
    pub now_playing: BTreeMap<String, NowPlaying>,
}

/// Live controller state.
pub struct ControllerState {
    selected: RwLock<Option<String>>,
    last_selected_name: RwLock<Option<String>>,
    volumes: DashMap<String, u8>,
    mutes: DashMap<String, bool>,
    group_volumes: DashMap<String, u8>,
    group_mutes: DashMap<String, bool>,
    now_playing: DashMap<String, NowPlaying>,
    emitter: Arc<dyn EventEmitter>,
}

impl ControllerState {
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            selected: RwLock::new(None),
            last_selected_name: RwLock::new(None),
            volumes: DashMap::new(),
            mutes: DashMap::new(),
            group_volumes: DashMap::new(),
            group_mutes: DashMap::new(),
            now_playing: DashMap::new(),
            emitter,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn selected(&self) -> Option<String> {
        self.selected.read().clone()
    }

    /// Name of the most recently selected device, kept across rediscovery.
    #[must_use]
    pub fn last_selected_name(&self) -> Option<String> {
        self.last_selected_name.read().clone()
    }

    /// Selects a device. Returns `true` if the selection changed.
    pub fn select(&self, device: &Device) -> bool {
        *self.last_selected_name.write() = Some(device.name.clone());
        let changed = {
            let mut selected = self.selected.write();
            let changed = selected.as_deref() != Some(device.id.as_str());
            *selected = Some(device.id.clone());
            changed
        };
        if changed {
            log::info!("[Controller] Selected {} ({})", device.name, device.id);
            self.emitter.emit_controller(ControllerEvent::SelectionChanged {
                device_id: Some(device.id.clone()),
                timestamp: now_millis(),
            });
        }
        changed
    }

    fn clear_selection(&self) {
        let previous = self.selected.write().take();
        if let Some(id) = previous {
            log::info!("[Controller] Selected device {} disappeared", id);
            self.emitter.emit_controller(ControllerEvent::SelectionChanged {
                device_id: None,
                timestamp: now_millis(),
            });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Volume / mute
    // ─────────────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn volume(&self, device_id: &str) -> Option<u8> {
        self.volumes.get(device_id).map(|v| *v)
    }

    #[must_use]
    pub fn mute(&self, device_id: &str) -> Option<bool> {
        self.mutes.get(device_id).map(|m| *m)
    }

    #[must_use]
    pub fn group_volume(&self, coordinator_id: &str) -> Option<u8> {
        self.group_volumes.get(coordinator_id).map(|v| *v)
    }

    #[must_use]
    pub fn group_mute(&self, coordinator_id: &str) -> Option<bool> {
        self.group_mutes.get(coordinator_id).map(|m| *m)
    }

    pub fn set_volume(&self, device_id: &str, volume: u8) {
        if self.volumes.insert(device_id.to_string(), volume) != Some(volume) {
            self.emitter.emit_controller(ControllerEvent::VolumeChanged {
                device_id: device_id.to_string(),
                volume,
                group: false,
                timestamp: now_millis(),
            });
        }
    }

    pub fn set_mute(&self, device_id: &str, muted: bool) {
        if self.mutes.insert(device_id.to_string(), muted) != Some(muted) {
            self.emitter.emit_controller(ControllerEvent::MuteChanged {
                device_id: device_id.to_string(),
                muted,
                group: false,
                timestamp: now_millis(),
            });
        }
    }

    pub fn set_group_volume(&self, coordinator_id: &str, volume: u8) {
        if self.group_volumes.insert(coordinator_id.to_string(), volume) != Some(volume) {
            self.emitter.emit_controller(ControllerEvent::VolumeChanged {
                device_id: coordinator_id.to_string(),
                volume,
                group: true,
                timestamp: now_millis(),
            });
        }
    }

    pub fn set_group_mute(&self, coordinator_id: &str, muted: bool) {
        if self.group_mutes.insert(coordinator_id.to_string(), muted) != Some(muted) {
            self.emitter.emit_controller(ControllerEvent::MuteChanged {
                device_id: coordinator_id.to_string(),
                muted,
                group: true,
                timestamp: now_millis(),
            });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Now playing
    // ─────────────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn now_playing(&self, coordinator_id: &str) -> Option<NowPlaying> {
        self.now_playing.get(coordinator_id).map(|np| np.clone())
    }

    /// Groups of `snapshot` with their source filled from the coordinator's
    /// now-playing entry; coordinators with no entry are idle.
    #[must_use]
    pub fn classify_groups(&self, snapshot: &TopologySnapshot) -> Vec<Group> {
        snapshot
            .groups
            .iter()
            .map(|group| Group {
                source: self
                    .now_playing
                    .get(&group.coordinator_id)
                    .map_or(SourceKind::Idle, |np| np.source),
                ..group.clone()
            })
            .collect()
    }

    /// Overwrites now-playing info for a coordinator.
    pub fn set_now_playing(&self, coordinator_id: &str, now_playing: NowPlaying) {
        let previous = self
            .now_playing
            .insert(coordinator_id.to_string(), now_playing.clone());
        if previous.as_ref() != Some(&now_playing) {
            self.emitter.emit_controller(ControllerEvent::NowPlayingChanged {
                coordinator_id: coordinator_id.to_string(),
                now_playing,
                timestamp: now_millis(),
            });
        }
    }

    /// Merges a transport notification into the coordinator's entry.
    ///
    /// Notifications may carry only some fields; absent fields keep their
    /// previous value and the source is re-classified from the result.
    fn apply_transport(
        &self,
        coordinator_id: &str,
        state: Option<TransportState>,
        uri: Option<&str>,
        track: Option<&TrackMetadata>,
    ) {
        let mut next = self.now_playing(coordinator_id).unwrap_or_default();
        if state.is_some() {
            next.transport_state = state;
        }
        if let Some(uri) = uri {
            next.uri = Some(uri.to_string()).filter(|u| !u.is_empty());
        }
        if let Some(track) = track {
            next.track = track.clone();
        }
        next.source = SourceKind::classify(next.uri.as_deref(), next.transport_state);
        self.set_now_playing(coordinator_id, next);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event + topology intake
    // ─────────────────────────────────────────────────────────────────────────

    /// Folds a device notification into the cache.
    pub fn apply_event(&self, event: &SonosEvent, snapshot: &TopologySnapshot) {
        match event {
            SonosEvent::TransportChanged {
                device_id,
                transport_state,
                uri,
                track,
                ..
            } => {
                // Members report `x-rincon:` and carry no useful state.
                if snapshot
                    .device(device_id)
                    .is_some_and(|d| !d.is_coordinator())
                {
                    return;
                }
                self.apply_transport(device_id, *transport_state, uri.as_deref(), track.as_ref());
            }
            SonosEvent::SpeakerVolume {
                device_id, volume, ..
            } => self.set_volume(device_id, *volume),
            SonosEvent::SpeakerMute {
                device_id, muted, ..
            } => self.set_mute(device_id, *muted),
            SonosEvent::GroupVolume {
                device_id, volume, ..
            } => {
                let coordinator = coordinator_key(snapshot, device_id);
                self.set_group_volume(&coordinator, *volume);
            }
            SonosEvent::GroupMute {
                device_id, muted, ..
            } => {
                let coordinator = coordinator_key(snapshot, device_id);
                self.set_group_mute(&coordinator, *muted);
            }
            SonosEvent::ZoneGroupsUpdated { .. } | SonosEvent::SubscriptionLost { .. } => {}
        }
    }

    /// Drops cached entries for devices that are gone and clears a
    /// selection that no longer exists.
    pub fn retain_devices(&self, snapshot: &TopologySnapshot) {
        let known = |id: &String| snapshot.device(id).is_some();
        self.volumes.retain(|id, _| known(id));
        self.mutes.retain(|id, _| known(id));
        let is_coordinator = |id: &String| snapshot.device(id).is_some_and(|d| d.is_coordinator());
        self.group_volumes.retain(|id, _| is_coordinator(id));
        self.group_mutes.retain(|id, _| is_coordinator(id));
        self.now_playing.retain(|id, _| is_coordinator(id));

        let selected = self.selected();
        if let Some(id) = selected {
            if snapshot.device(&id).is_none() {
                self.clear_selection();
            }
        }
    }

    /// Prunes stale entries, then re-selects the last selected device by
    /// name if nothing is selected and that device is back.
    pub fn reconcile(&self, snapshot: &TopologySnapshot) {
        self.retain_devices(snapshot);
        if self.selected().is_some() {
            return;
        }
        let Some(name) = self.last_selected_name() else {
            return;
        };
        if let Some(device) = snapshot.device_by_name(&name) {
            log::info!("[Controller] Auto-selected last device {}", device.name);
            self.select(device);
        }
    }

    /// Copies the whole state.
    #[must_use]
    pub fn snapshot(&self) -> ControllerSnapshot {
        fn collect<V: Clone>(map: &DashMap<String, V>) -> BTreeMap<String, V> {
            map.iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect()
        }
        ControllerSnapshot {
            selected_device_id: self.selected(),
            last_selected_name: self.last_selected_name(),
            volumes: collect(&self.volumes),
            mutes: collect(&self.mutes),
            group_volumes: collect(&self.group_volumes),
            group_mutes: collect(&self.group_mutes),
            now_playing: collect(&self.now_playing),
        }
    }
}

fn coordinator_key(snapshot: &TopologySnapshot, device_id: &str) -> String {
    snapshot
        .coordinator_of(device_id)
        .map(|d| d.id.clone())
        .unwrap_or_else(|| device_id.to_string())
}
