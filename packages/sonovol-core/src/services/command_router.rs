//! Command façade for hotkeys, menus and the CLI.
//!
//! Per-device commands (volume, mute) go to the selected visible device.
//! Group commands (group volume, transport) go to whichever device is the
//! coordinator of the selected device's group *right now*, looked up in the
//! current snapshot on every call. Grouping commands re-read the group state
//! from the devices before returning, so the next group command already sees
//! the new coordinator.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join;

use crate::error::{CommandError, CommandResult};
use crate::events::{EventEmitter, TopologyEvent};
use crate::protocol_constants::{GROUPING_CONFIRM_ATTEMPTS, GROUPING_CONFIRM_INTERVAL_MS};
use crate::runtime::TokioSpawner;
use crate::services::controller_state::{ControllerSnapshot, ControllerState};
use crate::services::coordinator_policy::{CoordinatorCandidate, CoordinatorPolicy};
use crate::services::topology::{resolve_topology, TopologyStore};
use crate::services::volume_debouncer::{VolumeDebouncer, VolumeTarget};
use crate::sonos::traits::{SonosControl, SonosTopology, SonosVolumeControl};
use crate::sonos::types::{Device, Group, NowPlaying, SourceKind, TopologySnapshot};
use crate::state::VolumeConfig;
use crate::utils::{clamp_volume, now_millis};

/// Routes commands to the right device.
pub struct CommandRouter {
    sonos: Arc<dyn SonosControl>,
    /// Group-state reads after grouping commands.
    topology_client: Arc<dyn SonosTopology>,
    topology: Arc<TopologyStore>,
    state: Arc<ControllerState>,
    emitter: Arc<dyn EventEmitter>,
    debouncer: VolumeDebouncer,
    policy: Arc<dyn CoordinatorPolicy>,
    volume_step: u8,
}

impl CommandRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new<C>(
        sonos: Arc<C>,
        topology: Arc<TopologyStore>,
        state: Arc<ControllerState>,
        emitter: Arc<dyn EventEmitter>,
        policy: Arc<dyn CoordinatorPolicy>,
        volume: &VolumeConfig,
        spawner: TokioSpawner,
    ) -> Self
    where
        C: SonosControl + SonosTopology + 'static,
    {
        let volume_control: Arc<dyn SonosVolumeControl> = sonos.clone();
        let topology_client: Arc<dyn SonosTopology> = sonos.clone();
        let debouncer =
            VolumeDebouncer::new(volume.debounce(), volume_control, Arc::clone(&state), spawner);
        Self {
            sonos,
            topology_client,
            topology,
            state,
            emitter,
            debouncer,
            policy,
            volume_step: volume.step,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    /// Selectable devices, sorted by name.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.topology
            .snapshot()
            .visible_devices()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Playback groups with the source each coordinator last reported.
    #[must_use]
    pub fn groups(&self) -> Vec<Group> {
        self.state.classify_groups(&self.topology.snapshot())
    }

    /// Current controller state.
    #[must_use]
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.state.snapshot()
    }

    /// Finds a device by id or room name; satellites resolve to their
    /// visible partner.
    fn lookup(snapshot: &TopologySnapshot, id_or_name: &str) -> CommandResult<Device> {
        let device = snapshot
            .device(id_or_name)
            .or_else(|| snapshot.device_by_name(id_or_name))
            .ok_or_else(|| CommandError::DeviceNotFound(id_or_name.to_string()))?;
        let visible_id = snapshot.resolve_visible(&device.id);
        snapshot
            .device(visible_id)
            .cloned()
            .ok_or_else(|| CommandError::DeviceNotFound(visible_id.to_string()))
    }

    fn selected_device(&self) -> CommandResult<Device> {
        let id = self.state.selected().ok_or(CommandError::NoDeviceSelected)?;
        Self::lookup(&self.topology.snapshot(), &id)
    }

    fn coordinator_for(snapshot: &TopologySnapshot, device: &Device) -> CommandResult<Device> {
        snapshot
            .coordinator_of(&device.id)
            .cloned()
            .ok_or_else(|| CommandError::DeviceNotFound(device.coordinator_id.clone()))
    }

    fn selected_coordinator(&self) -> CommandResult<Device> {
        let device = self.selected_device()?;
        Self::coordinator_for(&self.topology.snapshot(), &device)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────────

    /// Selects a device by id or name and loads its volume and mute.
    ///
    /// # Errors
    /// [`CommandError::DeviceNotFound`] if nothing matches. Failing to read
    /// the volume does not undo the selection.
    pub async fn select_device(&self, id_or_name: &str) -> CommandResult<Device> {
        let device = Self::lookup(&self.topology.snapshot(), id_or_name)?;
        self.state.select(&device);

        let (volume, mute) = join(
            self.sonos.get_speaker_volume(&device.ip),
            self.sonos.get_speaker_mute(&device.ip),
        )
        .await;
        match volume {
            Ok(v) => self.state.set_volume(&device.id, v),
            Err(e) => log::warn!("[Router] Could not read volume of {}: {}", device.name, e),
        }
        if let Ok(m) = mute {
            self.state.set_mute(&device.id, m);
        }
        Ok(device)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Volume
    // ─────────────────────────────────────────────────────────────────────────

    /// Raises the selected device's volume by one step.
    pub async fn volume_up(&self) -> CommandResult<u8> {
        self.adjust_volume(i32::from(self.volume_step)).await
    }

    /// Lowers the selected device's volume by one step.
    pub async fn volume_down(&self) -> CommandResult<u8> {
        self.adjust_volume(-i32::from(self.volume_step)).await
    }

    /// Applies `delta` on top of the most recent desired level, so repeated
    /// presses inside one debounce window accumulate.
    async fn adjust_volume(&self, delta: i32) -> CommandResult<u8> {
        let device = self.selected_device()?;
        let target = VolumeTarget::speaker(&device.id, &device.ip);

        let base = match self
            .debouncer
            .pending(&target)
            .or_else(|| self.state.volume(&device.id))
        {
            Some(level) => level,
            None => {
                let level = self.sonos.get_speaker_volume(&device.ip).await?;
                self.state.set_volume(&device.id, level);
                level
            }
        };

        let level = clamp_volume(i32::from(base) + delta);
        self.debouncer.submit(target, level);
        Ok(level)
    }

    /// Sets the selected device's own volume.
    pub async fn set_volume(&self, level: u8) -> CommandResult<u8> {
        let device = self.selected_device()?;
        let level = clamp_volume(i32::from(level));
        self.debouncer
            .submit(VolumeTarget::speaker(&device.id, &device.ip), level);
        Ok(level)
    }

    /// Sets the volume of the selected device's whole group with a single
    /// `SetGroupVolume` on the current coordinator.
    pub async fn set_group_volume(&self, level: u8) -> CommandResult<u8> {
        let coordinator = self.selected_coordinator()?;
        let level = clamp_volume(i32::from(level));
        self.debouncer
            .submit(VolumeTarget::group(&coordinator.id, &coordinator.ip), level);
        Ok(level)
    }

    /// Waits for debounced volume writes to reach the devices.
    pub async fn settle(&self) {
        self.debouncer.settle().await;
    }

    /// Reads the current group volume from the coordinator.
    pub async fn group_volume(&self) -> CommandResult<u8> {
        let coordinator = self.selected_coordinator()?;
        let level = self.sonos.get_group_volume(&coordinator.ip).await?;
        self.state.set_group_volume(&coordinator.id, level);
        Ok(level)
    }

    /// Flips the selected device's mute. Returns the new state.
    pub async fn toggle_mute(&self) -> CommandResult<bool> {
        let device = self.selected_device()?;
        let current = match self.state.mute(&device.id) {
            Some(muted) => muted,
            None => self.sonos.get_speaker_mute(&device.ip).await?,
        };
        let muted = !current;
        self.sonos.set_speaker_mute(&device.ip, muted).await?;
        self.state.set_mute(&device.id, muted);
        Ok(muted)
    }

    /// Mutes or unmutes the selected device's whole group.
    pub async fn set_group_mute(&self, muted: bool) -> CommandResult<()> {
        let coordinator = self.selected_coordinator()?;
        self.sonos.set_group_mute(&coordinator.ip, muted).await?;
        self.state.set_group_mute(&coordinator.id, muted);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Grouping
    // ─────────────────────────────────────────────────────────────────────────

    /// Makes `joining` a member of the group `into` currently belongs to.
    pub async fn create_group(&self, joining: &str, into: &str) -> CommandResult<()> {
        let snapshot = self.topology.snapshot();
        let joining = Self::lookup(&snapshot, joining)?;
        let into = Self::lookup(&snapshot, into)?;
        if joining.id == into.id {
            return Err(CommandError::InvalidGrouping(format!(
                "{} cannot join itself",
                joining.name
            )));
        }
        let coordinator = Self::coordinator_for(&snapshot, &into)?;
        log::info!(
            "[Router] {} joins {} (coordinator {})",
            joining.name,
            into.name,
            coordinator.name
        );
        self.sonos.join_group(&joining.ip, &coordinator.id).await?;
        self.await_membership(&joining, &coordinator.id).await;
        Ok(())
    }

    /// Groups two devices, letting the coordinator policy decide which
    /// side keeps playing. Returns the coordinator of the merged group.
    ///
    /// # Errors
    /// [`CommandError::AmbiguousCoordinator`] when both sides are playing
    /// sources of the same priority.
    pub async fn create_group_auto(&self, a: &str, b: &str) -> CommandResult<Device> {
        let snapshot = self.topology.snapshot();
        let devices = [Self::lookup(&snapshot, a)?, Self::lookup(&snapshot, b)?];
        if devices[0].id == devices[1].id {
            return Err(CommandError::InvalidGrouping(format!(
                "{} cannot join itself",
                devices[0].name
            )));
        }
        let coordinators = [
            Self::coordinator_for(&snapshot, &devices[0])?,
            Self::coordinator_for(&snapshot, &devices[1])?,
        ];
        if coordinators[0].id == coordinators[1].id {
            log::debug!("[Router] {} and {} already grouped", devices[0].name, devices[1].name);
            return Ok(coordinators[0].clone());
        }

        let (first, second) = join(
            self.source_of(&coordinators[0]),
            self.source_of(&coordinators[1]),
        )
        .await;
        let candidates = [
            CoordinatorCandidate {
                coordinator_id: coordinators[0].id.clone(),
                name: devices[0].name.clone(),
                source: first,
            },
            CoordinatorCandidate {
                coordinator_id: coordinators[1].id.clone(),
                name: devices[1].name.clone(),
                source: second,
            },
        ];
        let winner = self.policy.choose(&candidates)?;
        let loser = 1 - winner;

        log::info!(
            "[Router] Grouping {} into {} ({} beats {})",
            devices[loser].name,
            devices[winner].name,
            candidates[winner].source.label(),
            candidates[loser].source.label()
        );
        self.sonos
            .join_group(&devices[loser].ip, &coordinators[winner].id)
            .await?;
        self.await_membership(&devices[loser], &coordinators[winner].id)
            .await;
        Ok(coordinators[winner].clone())
    }

    /// What a coordinator is playing. Queries the device; falls back to the
    /// cached value, then to idle.
    async fn source_of(&self, coordinator: &Device) -> SourceKind {
        match self.refresh_now_playing_for(coordinator).await {
            Ok(now_playing) => now_playing.source,
            Err(e) => {
                log::debug!(
                    "[Router] Using cached source for {}: {}",
                    coordinator.name,
                    e
                );
                self.state
                    .now_playing(&coordinator.id)
                    .map_or(SourceKind::Idle, |np| np.source)
            }
        }
    }

    /// Makes a device standalone.
    pub async fn leave_group(&self, id_or_name: &str) -> CommandResult<()> {
        let device = Self::lookup(&self.topology.snapshot(), id_or_name)?;
        self.sonos.leave_group(&device.ip).await?;
        self.await_membership(&device, &device.id).await;
        Ok(())
    }

    /// Re-reads the group state until `device` follows `coordinator_id`,
    /// installing every answer on the way.
    ///
    /// Devices take a moment to publish a membership change. If it has not
    /// shown up after a few reads, the latest answer stays installed and the
    /// ZoneGroupTopology event finishes the job.
    async fn await_membership(&self, device: &Device, coordinator_id: &str) {
        for attempt in 1..=GROUPING_CONFIRM_ATTEMPTS {
            let candidates = self.topology.candidate_ips();
            match resolve_topology(&*self.topology_client, &candidates).await {
                Ok(snapshot) => {
                    let confirmed = snapshot
                        .device(&device.id)
                        .is_some_and(|d| d.coordinator_id == coordinator_id);
                    self.install(snapshot);
                    if confirmed {
                        return;
                    }
                }
                Err(e) => {
                    log::warn!("[Router] Could not re-read group state: {}", e);
                    return;
                }
            }
            if attempt < GROUPING_CONFIRM_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(GROUPING_CONFIRM_INTERVAL_MS)).await;
            }
        }
        log::warn!(
            "[Router] {} does not follow {} yet; waiting for the topology event",
            device.name,
            coordinator_id
        );
    }

    fn install(&self, snapshot: TopologySnapshot) {
        if !self.topology.replace(snapshot) {
            return;
        }
        let snapshot = self.topology.snapshot();
        self.state.reconcile(&snapshot);
        self.emitter.emit_topology(TopologyEvent::Updated {
            snapshot: (*snapshot).clone(),
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn play(&self) -> CommandResult<()> {
        let coordinator = self.selected_coordinator()?;
        Ok(self.sonos.play(&coordinator.ip).await?)
    }

    pub async fn pause(&self) -> CommandResult<()> {
        let coordinator = self.selected_coordinator()?;
        Ok(self.sonos.pause(&coordinator.ip).await?)
    }

    pub async fn next(&self) -> CommandResult<()> {
        let coordinator = self.selected_coordinator()?;
        Ok(self.sonos.next(&coordinator.ip).await?)
    }

    pub async fn previous(&self) -> CommandResult<()> {
        let coordinator = self.selected_coordinator()?;
        Ok(self.sonos.previous(&coordinator.ip).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Now playing
    // ─────────────────────────────────────────────────────────────────────────

    /// Queries now-playing info for the selected device's group.
    pub async fn refresh_now_playing(&self) -> CommandResult<NowPlaying> {
        let coordinator = self.selected_coordinator()?;
        self.refresh_now_playing_for(&coordinator).await
    }

    async fn refresh_now_playing_for(&self, coordinator: &Device) -> CommandResult<NowPlaying> {
        let info = self.sonos.get_transport_info(&coordinator.ip).await?;
        let media_uri = self.sonos.get_media_uri(&coordinator.ip).await?;
        let position = self.sonos.get_position_info(&coordinator.ip).await?;

        let uri = media_uri
            .filter(|u| !u.is_empty())
            .or(position.track_uri);
        let now_playing = NowPlaying {
            source: SourceKind::classify(uri.as_deref(), Some(info.state)),
            transport_state: Some(info.state),
            uri,
            track: position.track,
        };
        self.state.set_now_playing(&coordinator.id, now_playing.clone());
        Ok(now_playing)
    }
}
