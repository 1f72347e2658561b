//! Entry point for everything that keeps the household view current.
//!
//! Owns the [`TopologyMonitor`] (periodic resolution, subscription sync)
//! and the [`GenaEventProcessor`] (notifications into state).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::context::NetworkContext;
use crate::error::CoreResult;
use crate::events::EventEmitter;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::controller_state::ControllerState;
use crate::services::topology::TopologyStore;
use crate::sonos::gena::{GenaSubscriptionManager, NotifyError, SonosEvent};
use crate::sonos::traits::SonosTopologyClient;
use crate::sonos::types::TopologySnapshot;

use super::gena_event_processor::GenaEventProcessor;
use super::topology_monitor::TopologyMonitor;

/// Keeps the topology current and turns notifications into state.
///
/// A thin facade over [`TopologyMonitor`] and [`GenaEventProcessor`]; both
/// share one refresh signal so a lost subscription triggers a resolution.
pub struct DiscoveryService {
    topology_monitor: Arc<TopologyMonitor>,
    event_processor: Arc<GenaEventProcessor>,
    gena_manager: Arc<GenaSubscriptionManager>,
    spawner: TokioSpawner,
}

impl DiscoveryService {
    /// Wires the monitor and the event processor around one shared refresh
    /// signal. Nothing runs until [`start`](Self::start).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sonos: Arc<dyn SonosTopologyClient>,
        topology: Arc<TopologyStore>,
        gena_manager: Arc<GenaSubscriptionManager>,
        gena_event_rx: mpsc::Receiver<SonosEvent>,
        state: Arc<ControllerState>,
        emitter: Arc<dyn EventEmitter>,
        network: NetworkContext,
        refresh_interval: Duration,
        spawner: TokioSpawner,
        cancel_token: CancellationToken,
    ) -> Self {
        let refresh_notify = Arc::new(Notify::new());

        let topology_monitor = Arc::new(TopologyMonitor::new(
            sonos,
            Arc::clone(&topology),
            Arc::clone(&gena_manager),
            Arc::clone(&state),
            Arc::clone(&emitter),
            network,
            Arc::clone(&refresh_notify),
            refresh_interval,
            cancel_token,
        ));

        let event_processor = Arc::new(GenaEventProcessor::new(
            Arc::clone(&gena_manager),
            topology,
            state,
            emitter,
            gena_event_rx,
            refresh_notify,
            spawner.clone(),
        ));

        Self {
            topology_monitor,
            event_processor,
            gena_manager,
            spawner,
        }
    }

    /// Triggers a manual topology refresh.
    pub fn trigger_refresh(&self) {
        self.topology_monitor.trigger_refresh();
    }

    /// Resolves the topology once without subscribing.
    ///
    /// # Errors
    /// See [`TopologyMonitor::resolve`].
    pub async fn resolve_once(&self) -> CoreResult<Arc<TopologySnapshot>> {
        self.topology_monitor.resolve().await
    }

    /// Handles a GENA NOTIFY from the HTTP listener.
    ///
    /// # Errors
    /// [`NotifyError::UnknownSid`] when the SID is not ours.
    pub fn handle_gena_notify(
        &self,
        sid: &str,
        seq: Option<u32>,
        body: &str,
    ) -> Result<Vec<SonosEvent>, NotifyError> {
        self.event_processor.handle_gena_notify(sid, seq, body)
    }

    /// Starts the event forwarder and the background topology monitor.
    ///
    /// The monitor waits for the listener port before its first pass.
    pub fn start(&self) {
        self.event_processor.start_event_forwarder();
        let monitor = Arc::clone(&self.topology_monitor);
        self.spawner.spawn(async move { monitor.run().await });
    }

    /// Cancels renewals and unsubscribes everything (graceful shutdown).
    pub async fn shutdown(&self) {
        self.gena_manager.shutdown().await;
    }
}
