//! Coalescing of volume bursts.
//!
//! Holding a volume key produces a request every few milliseconds. The
//! debouncer keeps only the latest desired level per target and sends it once
//! the window that the first request opened has elapsed. Requests already on
//! the wire are never cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::controller_state::ControllerState;
use crate::sonos::traits::SonosVolumeControl;

const SETTLE_POLL: Duration = Duration::from_millis(10);

/// Whether a level applies to one speaker or to a whole group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeScope {
    /// `RenderingControl` on the addressed speaker.
    Speaker,
    /// `GroupRenderingControl` on the coordinator.
    Group,
}

/// Where a debounced level goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeTarget {
    pub device_id: String,
    pub ip: String,
    pub scope: VolumeScope,
}

impl VolumeTarget {
    pub fn speaker(device_id: &str, ip: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            ip: ip.to_string(),
            scope: VolumeScope::Speaker,
        }
    }

    pub fn group(coordinator_id: &str, ip: &str) -> Self {
        Self {
            device_id: coordinator_id.to_string(),
            ip: ip.to_string(),
            scope: VolumeScope::Group,
        }
    }
}

/// Per-target latest-wins debouncer.
pub struct VolumeDebouncer {
    window: Duration,
    pending: Arc<Mutex<HashMap<VolumeTarget, u8>>>,
    /// Windows opened but not yet flushed.
    in_flight: Arc<AtomicUsize>,
    sonos: Arc<dyn SonosVolumeControl>,
    state: Arc<ControllerState>,
    spawner: TokioSpawner,
}

impl VolumeDebouncer {
    pub fn new(
        window: Duration,
        sonos: Arc<dyn SonosVolumeControl>,
        state: Arc<ControllerState>,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            window,
            pending: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            sonos,
            state,
            spawner,
        }
    }

    /// Level waiting to be sent for `target`, if any.
    #[must_use]
    pub fn pending(&self, target: &VolumeTarget) -> Option<u8> {
        self.pending.lock().get(target).copied()
    }

    /// Records the desired level. The first request for an idle target opens
    /// a window; later requests inside it only replace the level.
    pub fn submit(&self, target: VolumeTarget, level: u8) {
        let opens_window = self.pending.lock().insert(target.clone(), level).is_none();
        if !opens_window {
            return;
        }

        let window = self.window;
        let pending = Arc::clone(&self.pending);
        let in_flight = Arc::clone(&self.in_flight);
        let sonos = Arc::clone(&self.sonos);
        let state = Arc::clone(&self.state);

        in_flight.fetch_add(1, Ordering::SeqCst);
        self.spawner.spawn(async move {
            tokio::time::sleep(window).await;
            let level = pending.lock().remove(&target);
            if let Some(level) = level {
                flush(sonos.as_ref(), &state, &target, level).await;
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Waits until every queued level has been sent.
    pub async fn settle(&self) {
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }
}

async fn flush(
    sonos: &dyn SonosVolumeControl,
    state: &ControllerState,
    target: &VolumeTarget,
    level: u8,
) {
    let result = match target.scope {
        VolumeScope::Speaker => sonos.set_speaker_volume(&target.ip, level).await,
        VolumeScope::Group => sonos.set_group_volume(&target.ip, level).await,
    };
    match result {
        Ok(()) => {
            log::debug!(
                "[Volume] {:?} volume of {} set to {}",
                target.scope,
                target.device_id,
                level
            );
            match target.scope {
                VolumeScope::Speaker => state.set_volume(&target.device_id, level),
                VolumeScope::Group => state.set_group_volume(&target.device_id, level),
            }
        }
        Err(e) => log::warn!(
            "[Volume] Failed to set {:?} volume of {} at {}: {}",
            target.scope,
            target.device_id,
            target.ip,
            e
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::sonos::soap::SoapResult;
    use async_trait::async_trait;

    /// Records every write; reads return fixed levels.
    #[derive(Default)]
    pub(crate) struct RecordingVolume {
        pub writes: Mutex<Vec<(VolumeScope, String, u8)>>,
        pub mute_writes: Mutex<Vec<(VolumeScope, String, bool)>>,
    }

    #[async_trait]
    impl SonosVolumeControl for RecordingVolume {
        async fn get_group_volume(&self, _: &str) -> SoapResult<u8> {
            Ok(40)
        }
        async fn set_group_volume(&self, ip: &str, volume: u8) -> SoapResult<()> {
            self.writes
                .lock()
                .push((VolumeScope::Group, ip.to_string(), volume));
            Ok(())
        }
        async fn set_relative_group_volume(&self, _: &str, delta: i8) -> SoapResult<u8> {
            Ok(crate::utils::clamp_volume(40 + i32::from(delta)))
        }
        async fn snapshot_group_volume(&self, _: &str) -> SoapResult<()> {
            Ok(())
        }
        async fn get_group_mute(&self, _: &str) -> SoapResult<bool> {
            Ok(false)
        }
        async fn set_group_mute(&self, ip: &str, mute: bool) -> SoapResult<()> {
            self.mute_writes
                .lock()
                .push((VolumeScope::Group, ip.to_string(), mute));
            Ok(())
        }
        async fn get_speaker_volume(&self, _: &str) -> SoapResult<u8> {
            Ok(20)
        }
        async fn set_speaker_volume(&self, ip: &str, volume: u8) -> SoapResult<()> {
            self.writes
                .lock()
                .push((VolumeScope::Speaker, ip.to_string(), volume));
            Ok(())
        }
        async fn get_speaker_mute(&self, _: &str) -> SoapResult<bool> {
            Ok(false)
        }
        async fn set_speaker_mute(&self, ip: &str, mute: bool) -> SoapResult<()> {
            self.mute_writes
                .lock()
                .push((VolumeScope::Speaker, ip.to_string(), mute));
            Ok(())
        }
    }

    fn debouncer(sonos: Arc<RecordingVolume>) -> (VolumeDebouncer, Arc<ControllerState>) {
        let state = Arc::new(ControllerState::new(Arc::new(NoopEventEmitter)));
        let debouncer = VolumeDebouncer::new(
            Duration::from_millis(150),
            sonos,
            Arc::clone(&state),
            TokioSpawner::current(),
        );
        (debouncer, state)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_sends_only_latest_level() {
        let sonos = Arc::new(RecordingVolume::default());
        let (debouncer, state) = debouncer(sonos.clone());
        let target = VolumeTarget::speaker("RINCON_K1400", "192.168.1.20");

        for level in [25, 30, 35, 40] {
            debouncer.submit(target.clone(), level);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(debouncer.pending(&target), Some(40));
        assert!(sonos.writes.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            *sonos.writes.lock(),
            vec![(VolumeScope::Speaker, "192.168.1.20".to_string(), 40)]
        );
        assert_eq!(state.volume("RINCON_K1400"), Some(40));
        assert_eq!(debouncer.pending(&target), None);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_windows_send_separately() {
        let sonos = Arc::new(RecordingVolume::default());
        let (debouncer, _) = debouncer(sonos.clone());
        let target = VolumeTarget::group("RINCON_K1400", "192.168.1.20");

        debouncer.submit(target.clone(), 10);
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.submit(target.clone(), 15);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let levels: Vec<u8> = sonos.writes.lock().iter().map(|w| w.2).collect();
        assert_eq!(levels, vec![10, 15]);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_waits_for_pending_writes() {
        let sonos = Arc::new(RecordingVolume::default());
        let (debouncer, _) = debouncer(sonos.clone());

        debouncer.submit(VolumeTarget::speaker("RINCON_K1400", "192.168.1.20"), 33);
        debouncer.settle().await;
        assert_eq!(sonos.writes.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn speaker_and_group_targets_are_independent() {
        let sonos = Arc::new(RecordingVolume::default());
        let (debouncer, _) = debouncer(sonos.clone());

        debouncer.submit(VolumeTarget::speaker("RINCON_B1400", "192.168.1.21"), 12);
        debouncer.submit(VolumeTarget::group("RINCON_K1400", "192.168.1.20"), 50);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut writes = sonos.writes.lock().clone();
        writes.sort_by_key(|w| w.2);
        assert_eq!(
            writes,
            vec![
                (VolumeScope::Speaker, "192.168.1.21".to_string(), 12),
                (VolumeScope::Group, "192.168.1.20".to_string(), 50),
            ]
        );
    }
}
