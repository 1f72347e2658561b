//! GENA event processing service.
//!
//! Responsibilities:
//! - Processing GENA NOTIFY requests
//! - Applying topology documents and re-syncing subscriptions
//! - Updating controller state from volume, mute and transport events
//! - Broadcasting events to listeners

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::events::{EventEmitter, TopologyEvent};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::controller_state::ControllerState;
use crate::services::topology::TopologyStore;
use crate::sonos::gena::{GenaSubscriptionManager, NotifyError, SonosEvent};
use crate::utils::now_millis;

/// Dependencies required for event processing.
///
/// Shared between the HTTP path and the forwarder task.
#[derive(Clone)]
struct EventProcessorDeps {
    topology: Arc<TopologyStore>,
    state: Arc<ControllerState>,
    gena_manager: Arc<GenaSubscriptionManager>,
    emitter: Arc<dyn EventEmitter>,
    refresh_notify: Arc<Notify>,
    spawner: TokioSpawner,
}

/// Processes GENA events and updates application state.
pub struct GenaEventProcessor {
    deps: EventProcessorDeps,
    gena_event_rx: Arc<Mutex<Option<mpsc::Receiver<SonosEvent>>>>,
}

impl GenaEventProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gena_manager: Arc<GenaSubscriptionManager>,
        topology: Arc<TopologyStore>,
        state: Arc<ControllerState>,
        emitter: Arc<dyn EventEmitter>,
        gena_event_rx: mpsc::Receiver<SonosEvent>,
        refresh_notify: Arc<Notify>,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            deps: EventProcessorDeps {
                topology,
                state,
                gena_manager,
                emitter,
                refresh_notify,
                spawner,
            },
            gena_event_rx: Arc::new(Mutex::new(Some(gena_event_rx))),
        }
    }

    /// Handles a GENA NOTIFY from the HTTP listener.
    ///
    /// # Errors
    /// [`NotifyError::UnknownSid`] when the SID is not ours; the listener
    /// answers `412` so the device drops the subscription.
    pub fn handle_gena_notify(
        &self,
        sid: &str,
        seq: Option<u32>,
        body: &str,
    ) -> Result<Vec<SonosEvent>, NotifyError> {
        let events = self.deps.gena_manager.handle_notify(sid, seq, body)?;
        for event in &events {
            Self::process_event_with_deps(&self.deps, event);
        }
        Ok(events)
    }

    /// Core event processing logic shared by both event paths.
    fn process_event_with_deps(deps: &EventProcessorDeps, event: &SonosEvent) {
        match event {
            SonosEvent::ZoneGroupsUpdated { groups, .. } => {
                log::info!(
                    "[GenaEventProcessor] Zone groups updated: {} groups",
                    groups.len()
                );
                match deps.topology.apply_groups(groups) {
                    Ok(true) => {
                        let snapshot = deps.topology.snapshot();
                        deps.state.reconcile(&snapshot);
                        deps.emitter.emit_topology(TopologyEvent::Updated {
                            snapshot: (*snapshot).clone(),
                            timestamp: now_millis(),
                        });

                        let gena_manager = Arc::clone(&deps.gena_manager);
                        deps.spawner.spawn(async move {
                            gena_manager.sync_devices(&snapshot).await;
                        });
                    }
                    Ok(false) => {}
                    Err(e) => {
                        log::warn!(
                            "[GenaEventProcessor] Rejected topology document: {}",
                            e
                        );
                        deps.emitter.emit_topology(TopologyEvent::Rejected {
                            reason: e.to_string(),
                            timestamp: now_millis(),
                        });
                        deps.refresh_notify.notify_one();
                    }
                }
            }
            SonosEvent::SubscriptionLost {
                device_id,
                service,
                reason,
                ..
            } => {
                log::error!(
                    "[GenaEventProcessor] Subscription lost for {} on {}: {}",
                    service,
                    device_id,
                    reason
                );
                deps.refresh_notify.notify_one();
            }
            other => {
                log::debug!("[GenaEventProcessor] {:?}", other);
                deps.state.apply_event(other, &deps.topology.snapshot());
            }
        }

        deps.emitter.emit_sonos(event.clone());
    }

    /// Spawns a task that drains events raised inside the subscription
    /// manager (renewal failures) through the same processing path.
    pub fn start_event_forwarder(&self) {
        let deps = self.deps.clone();
        let gena_event_rx = self.gena_event_rx.clone();

        self.deps.spawner.spawn(async move {
            let rx = gena_event_rx.lock().take();
            if let Some(mut rx) = rx {
                while let Some(event) = rx.recv().await {
                    Self::process_event_with_deps(&deps, &event);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NetworkContext;
    use crate::events::emitter::tests::RecordingEmitter;
    use crate::sonos::gena::GenaConfig;
    use crate::sonos::gena_client::{GenaResult, GenaTransport, SubscribeResponse};
    use crate::sonos::gena_parser::parse_zone_group_topology;
    use crate::sonos::services::SonosService;
    use crate::sonos::test_fixtures::*;
    use crate::sonos::zone_groups::build_snapshot;
    use async_trait::async_trait;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct NamedSids;

    #[async_trait]
    impl GenaTransport for NamedSids {
        async fn subscribe(
            &self,
            ip: &str,
            service: SonosService,
            _: &str,
            requested: Duration,
        ) -> GenaResult<SubscribeResponse> {
            Ok(SubscribeResponse {
                sid: sid(ip, service),
                granted: requested,
            })
        }
        async fn renew(&self, _: &str, _: SonosService, _: &str, d: Duration) -> GenaResult<Duration> {
            Ok(d)
        }
        async fn unsubscribe(&self, _: &str, _: SonosService, _: &str) -> bool {
            true
        }
    }

    fn sid(ip: &str, service: SonosService) -> String {
        format!("uuid:{ip}:{}", service.name())
    }

    struct Fixture {
        processor: GenaEventProcessor,
        gena: Arc<GenaSubscriptionManager>,
        topology: Arc<TopologyStore>,
        state: Arc<ControllerState>,
        emitter: Arc<RecordingEmitter>,
        refresh_notify: Arc<Notify>,
        lost_tx: mpsc::Sender<SonosEvent>,
    }

    fn fixture() -> Fixture {
        let topology = Arc::new(TopologyStore::new());
        let emitter = Arc::new(RecordingEmitter::default());
        let state = Arc::new(ControllerState::new(emitter.clone()));
        let refresh_notify = Arc::new(Notify::new());
        let (gena, _) = GenaSubscriptionManager::new(
            Arc::new(NamedSids),
            Arc::clone(&topology),
            NetworkContext::explicit(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            GenaConfig::default(),
            TokioSpawner::current(),
            CancellationToken::new(),
        );
        let (lost_tx, lost_rx) = mpsc::channel(8);
        let processor = GenaEventProcessor::new(
            Arc::clone(&gena),
            Arc::clone(&topology),
            Arc::clone(&state),
            emitter.clone(),
            lost_rx,
            Arc::clone(&refresh_notify),
            TokioSpawner::current(),
        );
        Fixture {
            processor,
            gena,
            topology,
            state,
            emitter,
            refresh_notify,
            lost_tx,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn topology_notification_installs_snapshot_and_subscribes() {
        let f = fixture();
        f.gena
            .subscribe("RINCON_K1400", "192.168.1.20", SonosService::ZoneGroupTopology)
            .await
            .expect("subscribed");

        let events = f
            .processor
            .handle_gena_notify(
                &sid("192.168.1.20", SonosService::ZoneGroupTopology),
                Some(0),
                ZONE_GROUP_TOPOLOGY_NOTIFY,
            )
            .expect("events");
        assert_eq!(events.len(), 1);

        let snapshot = f.topology.snapshot();
        assert_eq!(snapshot.devices.len(), 4);
        assert_eq!(f.emitter.topology.load(Ordering::SeqCst), 1);
        assert_eq!(f.emitter.sonos.load(Ordering::SeqCst), 1);

        // Background sync: 4 devices x 3 services plus the existing topology record.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.gena.store().len(), 13);

        // Same document again changes nothing.
        f.processor
            .handle_gena_notify(
                &sid("192.168.1.20", SonosService::ZoneGroupTopology),
                Some(1),
                ZONE_GROUP_TOPOLOGY_NOTIFY,
            )
            .expect("events");
        assert_eq!(f.emitter.topology.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn member_group_volume_lands_on_coordinator() {
        let f = fixture();
        let groups = parse_zone_group_topology(ZONE_GROUP_TOPOLOGY_NOTIFY).expect("groups");
        f.topology.replace(build_snapshot(&groups).expect("snapshot"));
        f.gena
            .subscribe("RINCON_B1400", "192.168.1.21", SonosService::GroupRenderingControl)
            .await
            .expect("subscribed");

        f.processor
            .handle_gena_notify(
                &sid("192.168.1.21", SonosService::GroupRenderingControl),
                None,
                GROUP_RENDERING_NOTIFY,
            )
            .expect("events");

        assert_eq!(f.state.group_volume("RINCON_K1400"), Some(30));
        assert_eq!(f.state.group_mute("RINCON_K1400"), Some(true));
    }

    #[tokio::test]
    async fn unknown_sid_is_rejected() {
        let f = fixture();
        let result = f
            .processor
            .handle_gena_notify("uuid:nobody", Some(0), GROUP_RENDERING_NOTIFY);
        assert!(matches!(result, Err(NotifyError::UnknownSid(_))));
        assert_eq!(f.emitter.sonos.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_subscription_requests_refresh() {
        let f = fixture();
        f.processor.start_event_forwarder();

        f.lost_tx
            .send(SonosEvent::SubscriptionLost {
                device_id: "RINCON_K1400".into(),
                service: SonosService::AVTransport,
                reason: "renewal failed".into(),
                timestamp: 0,
            })
            .await
            .expect("send");

        tokio::time::timeout(Duration::from_secs(1), f.refresh_notify.notified())
            .await
            .expect("refresh requested");
        assert_eq!(f.emitter.sonos.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inconsistent_topology_notification_requests_refresh() {
        let f = fixture();
        f.gena
            .subscribe("RINCON_K1400", "192.168.1.20", SonosService::ZoneGroupTopology)
            .await
            .expect("subscribed");

        // Coordinator X is not a member of its own group.
        let inconsistent = ZONE_GROUP_TOPOLOGY_NOTIFY.replacen(
            "Coordinator=&quot;RINCON_K1400&quot;",
            "Coordinator=&quot;RINCON_X1400&quot;",
            1,
        );
        assert_ne!(inconsistent, ZONE_GROUP_TOPOLOGY_NOTIFY);

        f.processor
            .handle_gena_notify(
                &sid("192.168.1.20", SonosService::ZoneGroupTopology),
                Some(0),
                &inconsistent,
            )
            .expect("events");

        tokio::time::timeout(Duration::from_secs(1), f.refresh_notify.notified())
            .await
            .expect("refresh requested");
        assert!(f.topology.snapshot().is_empty());
        assert_eq!(f.emitter.topology.load(Ordering::SeqCst), 1);
    }
}
