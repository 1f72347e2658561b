//! Topology monitoring service.
//!
//! Responsibilities:
//! - Background resolution loop (interval + manual refresh)
//! - Falling back to multicast discovery when no known device answers
//! - Local address change detection and re-subscription
//! - Keeping GENA subscriptions in step with the snapshot

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::context::NetworkContext;
use crate::error::{CoreError, CoreResult};
use crate::events::{EventEmitter, TopologyEvent};
use crate::protocol_constants::TOPOLOGY_RETRY_DELAY_SECS;
use crate::services::controller_state::ControllerState;
use crate::services::topology::{resolve_topology, TopologyStore};
use crate::sonos::gena::GenaSubscriptionManager;
use crate::sonos::traits::SonosTopologyClient;
use crate::sonos::types::TopologySnapshot;
use crate::sonos::zone_groups::TopologyError;
use crate::utils::now_millis;

/// Monitors the household topology and keeps subscriptions in step.
pub struct TopologyMonitor {
    sonos: Arc<dyn SonosTopologyClient>,
    topology: Arc<TopologyStore>,
    gena_manager: Arc<GenaSubscriptionManager>,
    state: Arc<ControllerState>,
    emitter: Arc<dyn EventEmitter>,
    network: NetworkContext,
    refresh_notify: Arc<Notify>,
    refresh_interval: Duration,
    /// Set once any device has been seen; an empty result after that is
    /// worth a warning.
    devices_seen: AtomicBool,
    cancel_token: CancellationToken,
}

impl TopologyMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sonos: Arc<dyn SonosTopologyClient>,
        topology: Arc<TopologyStore>,
        gena_manager: Arc<GenaSubscriptionManager>,
        state: Arc<ControllerState>,
        emitter: Arc<dyn EventEmitter>,
        network: NetworkContext,
        refresh_notify: Arc<Notify>,
        refresh_interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            sonos,
            topology,
            gena_manager,
            state,
            emitter,
            network,
            refresh_notify,
            refresh_interval,
            devices_seen: AtomicBool::new(false),
            cancel_token,
        }
    }

    /// Triggers a refresh outside the regular interval.
    pub fn trigger_refresh(&self) {
        self.refresh_notify.notify_one();
    }

    /// Runs the monitoring loop until cancelled.
    pub async fn run(self: Arc<Self>) {
        // Subscriptions need the listener's port in the callback URL.
        loop {
            let notified = self.network.port_notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent `set_port` is not missed.
            notified.as_mut().enable();
            if self.network.get_port() > 0 {
                break;
            }
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    log::info!("[TopologyMonitor] Cancelled while waiting for listener");
                    return;
                }
                _ = notified => {}
            }
        }
        log::info!(
            "[TopologyMonitor] GENA callback URL: {}",
            self.network.gena_callback_url()
        );

        let mut interval = tokio::time::interval(self.refresh_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let is_manual_refresh = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    log::info!("[TopologyMonitor] Shutting down monitoring loop");
                    break;
                }
                _ = interval.tick() => false,
                _ = self.refresh_notify.notified() => {
                    log::info!("[TopologyMonitor] Manual refresh triggered");
                    true
                }
            };
            if is_manual_refresh {
                interval.reset();
            }

            if self.network.refresh_local_ip() {
                log::warn!("[TopologyMonitor] Local address changed, re-subscribing");
                self.gena_manager.reset().await;
            }

            match self.refresh().await {
                Ok(_) => {}
                Err(CoreError::NoDevicesFound) => {
                    log::debug!("[TopologyMonitor] No devices found");
                }
                Err(CoreError::Topology(e)) => {
                    log::warn!(
                        "[TopologyMonitor] {}; retrying in {}s",
                        e,
                        TOPOLOGY_RETRY_DELAY_SECS
                    );
                    interval.reset_after(Duration::from_secs(TOPOLOGY_RETRY_DELAY_SECS));
                }
                Err(e) => log::error!("[TopologyMonitor] {}", e),
            }
        }
    }

    /// One full cycle: resolve, install, subscribe.
    ///
    /// # Errors
    /// See [`resolve`](Self::resolve). The previous snapshot stays in place.
    pub async fn refresh(&self) -> CoreResult<Arc<TopologySnapshot>> {
        let snapshot = self.resolve().await?;
        let summary = self.gena_manager.sync_devices(&snapshot).await;
        if summary.failed > 0 {
            log::warn!(
                "[TopologyMonitor] {} subscription(s) failed; retrying next cycle",
                summary.failed
            );
        }
        Ok(snapshot)
    }

    /// Resolves and installs a snapshot without touching subscriptions.
    ///
    /// Known devices are asked first; discovery runs only when the snapshot
    /// is empty or none of them answers.
    ///
    /// # Errors
    /// - [`CoreError::NoDevicesFound`] when discovery comes back empty.
    /// - [`CoreError::Discovery`] when the multicast socket cannot be used.
    /// - [`CoreError::Topology`] when devices answer with unusable documents;
    ///   a [`TopologyEvent::Rejected`] is emitted first.
    pub async fn resolve(&self) -> CoreResult<Arc<TopologySnapshot>> {
        let snapshot = match self.resolve_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(CoreError::Topology(e)) => {
                self.emitter.emit_topology(TopologyEvent::Rejected {
                    reason: e.to_string(),
                    timestamp: now_millis(),
                });
                return Err(e.into());
            }
            Err(e) => return Err(e),
        };

        let changed = self.topology.replace(snapshot);
        let snapshot = self.topology.snapshot();
        self.state.reconcile(&snapshot);

        if changed {
            log::info!(
                "[TopologyMonitor] Topology changed: {} device(s), {} group(s)",
                snapshot.devices.len(),
                snapshot.groups.len()
            );
            self.emitter.emit_topology(TopologyEvent::Updated {
                snapshot: (*snapshot).clone(),
                timestamp: now_millis(),
            });
        }
        Ok(snapshot)
    }

    async fn resolve_snapshot(&self) -> CoreResult<TopologySnapshot> {
        let candidates = self.topology.candidate_ips();
        let resolved = if candidates.is_empty() {
            None
        } else {
            match resolve_topology(&*self.sonos, &candidates).await {
                Ok(snapshot) => Some(snapshot),
                Err(TopologyError::Unreachable(reason)) => {
                    log::warn!(
                        "[TopologyMonitor] Known devices unreachable ({}), rediscovering",
                        reason
                    );
                    None
                }
                Err(e) => return Err(e.into()),
            }
        };

        match resolved {
            Some(snapshot) => Ok(snapshot),
            None => self.discover_and_resolve().await,
        }
    }

    async fn discover_and_resolve(&self) -> CoreResult<TopologySnapshot> {
        let discovered = self.sonos.discover_devices().await?;
        if discovered.is_empty() {
            if self.devices_seen.load(Ordering::Relaxed) {
                log::warn!("[TopologyMonitor] Previously seen devices are no longer visible");
            }
            self.emitter.emit_topology(TopologyEvent::NoDevicesFound {
                timestamp: now_millis(),
            });
            return Err(CoreError::NoDevicesFound);
        }
        self.devices_seen.store(true, Ordering::Relaxed);
        log::info!("[TopologyMonitor] Discovery found {} device(s)", discovered.len());

        let candidates: Vec<String> = discovered.into_iter().map(|d| d.ip).collect();
        Ok(resolve_topology(&*self.sonos, &candidates).await?)
    }
}
