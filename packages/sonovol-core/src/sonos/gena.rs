//! UPnP GENA subscription lifecycle.
//!
//! [`GenaSubscriptionManager`] keeps one subscription per (device, service)
//! for AVTransport, RenderingControl and GroupRenderingControl on every
//! known device, plus a single ZoneGroupTopology subscription. Each live
//! record owns a renewal timer that fires at a fraction (at most 80%) of the
//! duration the device granted. A failed renewal marks the record expired
//! and reports [`SonosEvent::SubscriptionLost`]; the next topology pass
//! subscribes it again.
//!
//! Inbound notifications are matched by SID, parsed, tagged with the
//! originating device and remapped from satellites to their visible partner.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::NetworkContext;
use crate::protocol_constants::GENA_EVENT_CHANNEL_CAPACITY;
use crate::runtime::TokioSpawner;
use crate::services::topology::TopologyStore;
use crate::sonos::gena_client::{GenaResult, GenaTransport};
use crate::sonos::gena_event_builder::{build_events, remap_to_visible};
use crate::sonos::gena_store::{GenaSubscriptionStore, SeqCheck, SubscriptionKey};
use crate::sonos::services::SonosService;
use crate::sonos::types::{TopologySnapshot, TrackMetadata, TransportState};
use crate::sonos::zone_groups::ZoneGroupEntry;
use crate::state::Config;
use crate::utils::now_millis;

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Typed state changes reported by devices.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SonosEvent {
    /// AVTransport state or source changed.
    TransportChanged {
        device_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        transport_state: Option<TransportState>,
        /// Transport binding (or current track) URI.
        #[serde(skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        track: Option<TrackMetadata>,
        timestamp: u64,
    },
    /// Per-speaker volume (RenderingControl, Master channel).
    SpeakerVolume {
        device_id: String,
        volume: u8,
        timestamp: u64,
    },
    /// Per-speaker mute.
    SpeakerMute {
        device_id: String,
        muted: bool,
        timestamp: u64,
    },
    /// Group volume as seen by a group member.
    GroupVolume {
        device_id: String,
        volume: u8,
        timestamp: u64,
    },
    /// Group mute as seen by a group member.
    GroupMute {
        device_id: String,
        muted: bool,
        timestamp: u64,
    },
    /// A new group-state document arrived.
    ZoneGroupsUpdated {
        groups: Vec<ZoneGroupEntry>,
        timestamp: u64,
    },
    /// A renewal failed; the device will stop sending notifications.
    SubscriptionLost {
        device_id: String,
        service: SonosService,
        reason: String,
        timestamp: u64,
    },
}

impl SonosEvent {
    /// Device the event is about, if it is about a single device.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::TransportChanged { device_id, .. }
            | Self::SpeakerVolume { device_id, .. }
            | Self::SpeakerMute { device_id, .. }
            | Self::GroupVolume { device_id, .. }
            | Self::GroupMute { device_id, .. }
            | Self::SubscriptionLost { device_id, .. } => Some(device_id),
            Self::ZoneGroupsUpdated { .. } => None,
        }
    }

    pub(crate) fn device_id_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::TransportChanged { device_id, .. }
            | Self::SpeakerVolume { device_id, .. }
            | Self::SpeakerMute { device_id, .. }
            | Self::GroupVolume { device_id, .. }
            | Self::GroupMute { device_id, .. }
            | Self::SubscriptionLost { device_id, .. } => Some(device_id),
            Self::ZoneGroupsUpdated { .. } => None,
        }
    }
}

/// Errors from handling an inbound notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The SID is not one of ours (stale, or meant for another listener).
    #[error("unknown subscription {0}")]
    UnknownSid(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Subscription timing.
#[derive(Debug, Clone)]
pub struct GenaConfig {
    /// Duration asked for in `TIMEOUT: Second-N`.
    pub requested: Duration,
    /// Fraction of the granted duration after which to renew.
    pub renewal_fraction: f64,
}

impl Default for GenaConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for GenaConfig {
    fn from(config: &Config) -> Self {
        Self {
            requested: Duration::from_secs(config.gena_timeout_secs),
            renewal_fraction: config.gena_renewal_fraction,
        }
    }
}

/// Result of reconciling subscriptions against a snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub subscribed: usize,
    pub failed: usize,
    pub removed: usize,
}

/// Owns every subscription record and its renewal timer.
pub struct GenaSubscriptionManager {
    transport: Arc<dyn GenaTransport>,
    store: Arc<GenaSubscriptionStore>,
    topology: Arc<TopologyStore>,
    network: NetworkContext,
    requested: Duration,
    event_tx: mpsc::Sender<SonosEvent>,
    spawner: TokioSpawner,
    cancel: CancellationToken,
    weak_self: Weak<Self>,
}

impl GenaSubscriptionManager {
    /// Creates the manager and the receiver for events it raises on its own
    /// (currently [`SonosEvent::SubscriptionLost`]).
    pub fn new(
        transport: Arc<dyn GenaTransport>,
        topology: Arc<TopologyStore>,
        network: NetworkContext,
        config: GenaConfig,
        spawner: TokioSpawner,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<SonosEvent>) {
        let (event_tx, event_rx) = mpsc::channel(GENA_EVENT_CHANNEL_CAPACITY);
        let manager = Arc::new_cyclic(|weak_self| Self {
            transport,
            store: Arc::new(GenaSubscriptionStore::new(config.renewal_fraction)),
            topology,
            network,
            requested: config.requested,
            event_tx,
            spawner,
            cancel,
            weak_self: weak_self.clone(),
        });
        (manager, event_rx)
    }

    /// Subscription records, for inspection.
    #[must_use]
    pub fn store(&self) -> &Arc<GenaSubscriptionStore> {
        &self.store
    }

    /// Subscribes one device to one service.
    ///
    /// Returns `Ok(false)` when the record was already live.
    ///
    /// # Errors
    /// The request failed; the record is back to `Unsubscribed` and is not
    /// retried until the next [`sync_devices`](Self::sync_devices).
    pub async fn subscribe(
        &self,
        device_id: &str,
        ip: &str,
        service: SonosService,
    ) -> GenaResult<bool> {
        let key = SubscriptionKey::new(device_id, service);
        if !self.store.begin_subscribe(&key, ip) {
            return Ok(false);
        }

        let callback_url = self.network.gena_callback_url();
        match self
            .transport
            .subscribe(ip, service, &callback_url, self.requested)
            .await
        {
            Ok(response) => match self.store.activate(&key, &response.sid, response.granted) {
                Some(delay) => {
                    log::info!(
                        "[GENA] Subscribed {} ({}), granted {}s, renewing in {}s",
                        key,
                        response.sid,
                        response.granted.as_secs(),
                        delay.as_secs()
                    );
                    self.schedule_renewal(key, delay);
                    Ok(true)
                }
                None => {
                    // Record was dropped while the request was in flight.
                    self.transport
                        .unsubscribe(ip, service, &response.sid)
                        .await;
                    Ok(false)
                }
            },
            Err(e) => {
                log::warn!("[GENA] Subscribe {} at {} failed: {}", key, ip, e);
                self.store.fail_subscribe(&key);
                Err(e)
            }
        }
    }

    fn schedule_renewal(&self, key: SubscriptionKey, delay: Duration) {
        let weak = self.weak_self.clone();
        let cancel = self.cancel.clone();
        let task_key = key.clone();

        let handle = self.spawner.spawn_abortable(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Some(manager) = weak.upgrade() {
                manager.renew(&task_key).await;
            }
        });
        self.store.set_renewal_task(&key, handle);
    }

    /// Renews one record. Called by its timer.
    async fn renew(&self, key: &SubscriptionKey) {
        let Some((ip, sid)) = self.store.begin_renew(key) else {
            return;
        };

        match self
            .transport
            .renew(&ip, key.service, &sid, self.requested)
            .await
        {
            Ok(granted) => {
                if let Some(delay) = self.store.renewed(key, granted) {
                    log::debug!("[GENA] Renewed {} for {}s", key, granted.as_secs());
                    self.schedule_renewal(key.clone(), delay);
                }
            }
            Err(e) => {
                log::warn!("[GENA] Renewal of {} at {} failed: {}", key, ip, e);
                self.store.expire(key);
                self.emit(SonosEvent::SubscriptionLost {
                    device_id: key.device_id.clone(),
                    service: key.service,
                    reason: e.to_string(),
                    timestamp: now_millis(),
                });
            }
        }
    }

    /// Removes a record and sends `UNSUBSCRIBE` for its SID. The record is
    /// gone whether or not the device acknowledges.
    pub async fn unsubscribe(&self, key: &SubscriptionKey) {
        let Some((ip, sid)) = self.store.remove(key) else {
            return;
        };
        if let Some(sid) = sid {
            if self.transport.unsubscribe(&ip, key.service, &sid).await {
                log::debug!("[GENA] Unsubscribed {}", key);
            } else {
                log::debug!("[GENA] Unsubscribe {} not acknowledged", key);
            }
        }
    }

    /// Reconciles records with a snapshot: subscribes new devices, drops
    /// vanished ones, and follows address changes.
    pub async fn sync_devices(&self, snapshot: &TopologySnapshot) -> SyncSummary {
        let mut desired: BTreeSet<SubscriptionKey> = BTreeSet::new();
        for device in &snapshot.devices {
            self.store.update_ip(&device.id, &device.ip);
            for service in SonosService::PER_DEVICE {
                desired.insert(SubscriptionKey::new(&device.id, service));
            }
        }
        if let Some(topology_key) = self.topology_subscription_target(snapshot) {
            desired.insert(topology_key);
        }

        let stale: Vec<SubscriptionKey> = self
            .store
            .keys()
            .into_iter()
            .filter(|k| !desired.contains(k))
            .collect();
        let removed = stale.len();
        join_all(stale.iter().map(|key| self.unsubscribe(key))).await;

        let wanted: Vec<(SubscriptionKey, String)> = desired
            .into_iter()
            .filter(|k| !self.store.state(k).is_live())
            .filter_map(|k| {
                let ip = snapshot.device(&k.device_id)?.ip.clone();
                Some((k, ip))
            })
            .collect();

        let results = join_all(
            wanted
                .iter()
                .map(|(key, ip)| self.subscribe(&key.device_id, ip, key.service)),
        )
        .await;

        let mut summary = SyncSummary {
            removed,
            ..SyncSummary::default()
        };
        for result in results {
            match result {
                Ok(true) => summary.subscribed += 1,
                Ok(false) => {}
                Err(_) => summary.failed += 1,
            }
        }

        if summary != SyncSummary::default() {
            log::info!(
                "[GENA] Sync: {} subscribed, {} failed, {} removed ({} records)",
                summary.subscribed,
                summary.failed,
                summary.removed,
                self.store.len()
            );
        }
        summary
    }

    /// Keeps the current topology subscription if its device is still
    /// present, otherwise picks the first visible coordinator.
    fn topology_subscription_target(&self, snapshot: &TopologySnapshot) -> Option<SubscriptionKey> {
        let existing = self
            .store
            .live_keys_for(SonosService::ZoneGroupTopology)
            .into_iter()
            .find(|k| snapshot.device(&k.device_id).is_some());
        existing.or_else(|| {
            snapshot
                .devices
                .iter()
                .find(|d| d.visible && d.is_coordinator())
                .or_else(|| snapshot.devices.first())
                .map(|d| SubscriptionKey::new(&d.id, SonosService::ZoneGroupTopology))
        })
    }

    /// Handles one inbound `NOTIFY`.
    ///
    /// # Errors
    /// [`NotifyError::UnknownSid`] when the SID matches no record.
    pub fn handle_notify(
        &self,
        sid: &str,
        seq: Option<u32>,
        body: &str,
    ) -> Result<Vec<SonosEvent>, NotifyError> {
        let key = self
            .store
            .key_for_sid(sid)
            .ok_or_else(|| NotifyError::UnknownSid(sid.to_string()))?;
        let ip = self
            .store
            .get(&key)
            .map(|info| info.ip)
            .unwrap_or_default();

        if let Some(seq) = seq {
            if let SeqCheck::Gap { expected, got } = self.store.check_seq(&key, seq) {
                log::debug!(
                    "[GENA] {} missed events (expected SEQ {}, got {})",
                    key,
                    expected,
                    got
                );
            }
        }

        let events = build_events(key.service, &key.device_id, &ip, body);
        let snapshot = self.topology.snapshot();
        Ok(remap_to_visible(events, &snapshot))
    }

    fn emit(&self, event: SonosEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            log::warn!("[GENA] Dropping internal event: {}", e);
        }
    }

    /// Drops every subscription while staying usable, for when the callback
    /// URL changed and devices must be told the new one.
    pub async fn reset(&self) {
        let keys = self.store.keys();
        log::info!("[GENA] Resetting {} subscription(s)", keys.len());
        join_all(keys.iter().map(|key| self.unsubscribe(key))).await;
    }

    /// Cancels every timer and unsubscribes everything.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let keys = self.store.keys();
        log::info!("[GENA] Unsubscribing {} record(s)", keys.len());
        join_all(keys.iter().map(|key| self.unsubscribe(key))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sonos::gena_client::{GenaError, SubscribeResponse};
    use crate::sonos::gena_store::SubscriptionState;
    use crate::sonos::test_fixtures::*;
    use crate::sonos::zone_groups::build_snapshot;
    use crate::sonos::gena_parser::parse_zone_group_topology;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockTransport {
        granted: Duration,
        fail_subscribe: AtomicBool,
        fail_renew: AtomicBool,
        subscribes: AtomicUsize,
        renews: AtomicUsize,
        unsubscribed: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn new(granted: Duration) -> Arc<Self> {
            Arc::new(Self {
                granted,
                fail_subscribe: AtomicBool::new(false),
                fail_renew: AtomicBool::new(false),
                subscribes: AtomicUsize::new(0),
                renews: AtomicUsize::new(0),
                unsubscribed: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenaTransport for MockTransport {
        async fn subscribe(
            &self,
            ip: &str,
            service: SonosService,
            callback_url: &str,
            _requested: Duration,
        ) -> GenaResult<SubscribeResponse> {
            assert!(callback_url.ends_with("/gena"));
            if self.fail_subscribe.load(Ordering::SeqCst) {
                return Err(GenaError::SubscriptionFailed(503));
            }
            let n = self.subscribes.fetch_add(1, Ordering::SeqCst);
            Ok(SubscribeResponse {
                sid: format!("uuid:{}-{}-{}", ip, service.name(), n),
                granted: self.granted,
            })
        }

        async fn renew(
            &self,
            _ip: &str,
            _service: SonosService,
            _sid: &str,
            _requested: Duration,
        ) -> GenaResult<Duration> {
            self.renews.fetch_add(1, Ordering::SeqCst);
            if self.fail_renew.load(Ordering::SeqCst) {
                return Err(GenaError::RenewalFailed(412));
            }
            Ok(self.granted)
        }

        async fn unsubscribe(&self, _ip: &str, _service: SonosService, sid: &str) -> bool {
            self.unsubscribed.lock().push(sid.to_string());
            true
        }
    }

    fn manager(
        transport: Arc<MockTransport>,
        topology: Arc<TopologyStore>,
    ) -> (Arc<GenaSubscriptionManager>, mpsc::Receiver<SonosEvent>) {
        GenaSubscriptionManager::new(
            transport,
            topology,
            NetworkContext::explicit(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            GenaConfig::default(),
            TokioSpawner::current(),
            CancellationToken::new(),
        )
    }

    fn sample_snapshot() -> TopologySnapshot {
        let groups = parse_zone_group_topology(ZONE_GROUP_TOPOLOGY_NOTIFY).expect("groups");
        build_snapshot(&groups).expect("snapshot")
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_fires_at_eighty_percent_of_grant() {
        let transport = MockTransport::new(Duration::from_secs(300));
        let (manager, _rx) = manager(transport.clone(), Arc::new(TopologyStore::new()));

        assert!(manager
            .subscribe("RINCON_K1400", "192.168.1.20", SonosService::AVTransport)
            .await
            .expect("subscribed"));

        tokio::time::sleep(Duration::from_secs(239)).await;
        assert_eq!(transport.renews.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.renews.load(Ordering::SeqCst), 1);

        // The next renewal is scheduled from the new grant.
        tokio::time::sleep(Duration::from_secs(240)).await;
        assert_eq!(transport.renews.load(Ordering::SeqCst), 2);

        let key = SubscriptionKey::new("RINCON_K1400", SonosService::AVTransport);
        assert_eq!(manager.store().state(&key), SubscriptionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_renewal_expires_and_reports() {
        let transport = MockTransport::new(Duration::from_secs(100));
        transport.fail_renew.store(true, Ordering::SeqCst);
        let (manager, mut rx) = manager(transport.clone(), Arc::new(TopologyStore::new()));

        manager
            .subscribe("RINCON_K1400", "192.168.1.20", SonosService::RenderingControl)
            .await
            .expect("subscribed");

        tokio::time::sleep(Duration::from_secs(81)).await;

        let key = SubscriptionKey::new("RINCON_K1400", SonosService::RenderingControl);
        assert_eq!(manager.store().state(&key), SubscriptionState::Expired);
        match rx.try_recv() {
            Ok(SonosEvent::SubscriptionLost {
                device_id, service, ..
            }) => {
                assert_eq!(device_id, "RINCON_K1400");
                assert_eq!(service, SonosService::RenderingControl);
            }
            other => panic!("expected SubscriptionLost, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_subscribe_returns_to_unsubscribed() {
        let transport = MockTransport::new(Duration::from_secs(300));
        transport.fail_subscribe.store(true, Ordering::SeqCst);
        let (manager, _rx) = manager(transport.clone(), Arc::new(TopologyStore::new()));

        let result = manager
            .subscribe("RINCON_K1400", "192.168.1.20", SonosService::AVTransport)
            .await;
        assert!(result.is_err());

        let key = SubscriptionKey::new("RINCON_K1400", SonosService::AVTransport);
        assert_eq!(manager.store().state(&key), SubscriptionState::Unsubscribed);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_subscribes_every_device_and_one_topology() {
        let transport = MockTransport::new(Duration::from_secs(300));
        let (manager, _rx) = manager(transport.clone(), Arc::new(TopologyStore::new()));
        let snapshot = sample_snapshot();

        let summary = manager.sync_devices(&snapshot).await;
        // 4 devices x 3 services + 1 topology subscription
        assert_eq!(summary.subscribed, 13);
        assert_eq!(summary.failed, 0);

        // Second pass is a no-op.
        let summary = manager.sync_devices(&snapshot).await;
        assert_eq!(summary, SyncSummary::default());
        assert_eq!(
            manager.store().live_keys_for(SonosService::ZoneGroupTopology).len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_device_is_unsubscribed() {
        let transport = MockTransport::new(Duration::from_secs(300));
        let (manager, _rx) = manager(transport.clone(), Arc::new(TopologyStore::new()));
        manager.sync_devices(&sample_snapshot()).await;

        let mut smaller = sample_snapshot();
        smaller.devices.retain(|d| d.id != "RINCON_B1400");
        let summary = manager.sync_devices(&smaller).await;

        assert_eq!(summary.removed, 3);
        assert_eq!(transport.unsubscribed.lock().len(), 3);
        let key = SubscriptionKey::new("RINCON_B1400", SonosService::AVTransport);
        assert!(manager.store().get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn notify_from_satellite_is_remapped() {
        let transport = MockTransport::new(Duration::from_secs(300));
        let topology = Arc::new(TopologyStore::new());
        topology.replace(sample_snapshot());
        let (manager, _rx) = manager(transport.clone(), Arc::clone(&topology));

        manager
            .subscribe("RINCON_S1400", "192.168.1.31", SonosService::RenderingControl)
            .await
            .expect("subscribed");
        let key = SubscriptionKey::new("RINCON_S1400", SonosService::RenderingControl);
        let sid = manager.store().get(&key).and_then(|i| i.sid).expect("sid");

        let events = manager
            .handle_notify(&sid, Some(0), RENDERING_CONTROL_NOTIFY_FULL)
            .expect("events");
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.device_id() == Some("RINCON_V1400")));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_sid_is_rejected() {
        let transport = MockTransport::new(Duration::from_secs(300));
        let (manager, _rx) = manager(transport, Arc::new(TopologyStore::new()));
        let result = manager.handle_notify("uuid:nobody", Some(0), GROUP_RENDERING_NOTIFY);
        assert!(matches!(result, Err(NotifyError::UnknownSid(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_unsubscribes_and_stops_timers() {
        let transport = MockTransport::new(Duration::from_secs(100));
        let (manager, _rx) = manager(transport.clone(), Arc::new(TopologyStore::new()));
        manager
            .subscribe("RINCON_K1400", "192.168.1.20", SonosService::AVTransport)
            .await
            .expect("subscribed");

        manager.shutdown().await;
        assert_eq!(transport.unsubscribed.lock().len(), 1);
        assert!(manager.store().is_empty());

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(transport.renews.load(Ordering::SeqCst), 0);
    }
}
