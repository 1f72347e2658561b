//! Engine bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Front ends get an
//! [`Engine`] and use its accessors; nothing else constructs services.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Client;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::api::{self, AppState};
use crate::context::{LocalIpDetector, NetworkContext, NetworkError};
use crate::error::{CoreError, CoreResult};
use crate::events::{BroadcastEvent, BroadcastEventBridge, EventEmitter};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::{
    CommandRouter, ControllerSnapshot, ControllerState, CoordinatorPolicy, DiscoveryService,
    PriorityPolicy, TopologyStore,
};
use crate::sonos::discovery::{DiscoveredDevice, DiscoveryConfig};
use crate::sonos::gena::{GenaConfig, GenaSubscriptionManager};
use crate::sonos::gena_client::GenaClient;
use crate::sonos::traits::{SonosDiscovery, SonosTopologyClient};
use crate::sonos::types::TopologySnapshot;
use crate::sonos::SonosClientImpl;
use crate::state::Config;

/// All wired services of one engine instance.
pub struct Engine {
    config: Config,
    sonos: Arc<SonosClientImpl>,
    topology: Arc<TopologyStore>,
    state: Arc<ControllerState>,
    router: Arc<CommandRouter>,
    discovery_service: Arc<DiscoveryService>,
    event_bridge: Arc<BroadcastEventBridge>,
    network: NetworkContext,
    spawner: TokioSpawner,
    cancel_token: CancellationToken,
    started: AtomicBool,
}

impl Engine {
    /// Command façade.
    #[must_use]
    pub fn router(&self) -> &Arc<CommandRouter> {
        &self.router
    }

    /// Stream of every event the engine broadcasts.
    #[must_use]
    pub fn events(&self) -> BroadcastStream<BroadcastEvent> {
        self.event_bridge.stream()
    }

    #[must_use]
    pub fn event_bridge(&self) -> &Arc<BroadcastEventBridge> {
        &self.event_bridge
    }

    /// Current topology snapshot.
    #[must_use]
    pub fn topology(&self) -> Arc<TopologySnapshot> {
        self.topology.snapshot()
    }

    /// Current controller state.
    #[must_use]
    pub fn controller_snapshot(&self) -> ControllerSnapshot {
        self.state.snapshot()
    }

    #[must_use]
    pub fn network(&self) -> &NetworkContext {
        &self.network
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one multicast discovery pass and returns what answered.
    ///
    /// # Errors
    /// [`CoreError::Discovery`] when no socket could be opened.
    pub async fn discover(&self) -> CoreResult<Vec<DiscoveredDevice>> {
        Ok(self.sonos.discover_devices().await?)
    }

    /// Resolves the topology once, without the listener or subscriptions.
    ///
    /// One-shot commands use this before routing.
    ///
    /// # Errors
    /// [`CoreError::NoDevicesFound`] and resolution errors.
    pub async fn refresh_once(&self) -> CoreResult<Arc<TopologySnapshot>> {
        self.discovery_service.resolve_once().await
    }

    /// Binds the callback listener and starts background monitoring.
    ///
    /// Returns the bound port. Calling it again is a no-op returning the
    /// current port.
    ///
    /// # Errors
    /// [`CoreError::Listener`] when the port cannot be bound.
    pub async fn start(&self) -> CoreResult<u16> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(self.network.get_port());
        }

        let listener = match api::bind_listener(self.config.callback_port).await {
            Ok(listener) => listener,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(CoreError::Listener(e));
            }
        };
        let port = listener.local_addr().map_err(CoreError::Listener)?.port();

        let state = AppState {
            discovery_service: Arc::clone(&self.discovery_service),
            router: Arc::clone(&self.router),
            topology: Arc::clone(&self.topology),
            network: self.network.clone(),
        };
        let cancel = self.cancel_token.clone();
        self.spawner.spawn(async move {
            if let Err(e) = api::serve(listener, state, cancel).await {
                log::error!("[Listener] Stopped: {}", e);
            }
        });

        self.discovery_service.start();
        Ok(port)
    }

    /// Flushes pending volume writes, unsubscribes, and stops every task.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.router.settle().await;
        self.discovery_service.shutdown().await;
        self.cancel_token.cancel();

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client for all device communication.
///
/// Using a shared client enables connection pooling.
fn create_http_client(config: &Config) -> CoreResult<Client> {
    Client::builder()
        .timeout(config.soap_timeout())
        .build()
        .map_err(|e| CoreError::Configuration(format!("HTTP client: {e}")))
}

fn create_network_context(config: &Config) -> CoreResult<NetworkContext> {
    // The port stays 0 until the listener has bound.
    match &config.advertise_ip {
        Some(raw) => {
            let ip: IpAddr = raw
                .parse()
                .map_err(|_| NetworkError::InvalidAddress(raw.clone()))?;
            Ok(NetworkContext::explicit(ip))
        }
        None => Ok(NetworkContext::auto_detect(LocalIpDetector::arc())?),
    }
}

/// Bootstraps an engine with the default coordinator policy.
///
/// # Errors
/// See [`bootstrap_engine_with_policy`].
pub fn bootstrap_engine(config: Config) -> CoreResult<Engine> {
    bootstrap_engine_with_policy(config, Arc::new(PriorityPolicy))
}

/// Bootstraps all services with their dependencies.
///
/// Services are created in dependency order:
///
/// 1. Shared infrastructure (HTTP client, event bridge, cancellation token)
/// 2. Network context (advertise address; port assigned by the listener)
/// 3. Device client, topology store, controller state
/// 4. Subscription manager (depends on topology and network)
/// 5. Discovery service and command router
///
/// Must be called from inside a Tokio runtime.
///
/// # Errors
/// - [`CoreError::Configuration`] for invalid values or outside a runtime.
/// - [`CoreError::Network`] when the local address cannot be determined.
pub fn bootstrap_engine_with_policy(
    config: Config,
    policy: Arc<dyn CoordinatorPolicy>,
) -> CoreResult<Engine> {
    config.validate().map_err(CoreError::Configuration)?;

    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| CoreError::Configuration(format!("no Tokio runtime: {e}")))?;
    let spawner = TokioSpawner::new(handle);

    let http_client = create_http_client(&config)?;
    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    let emitter: Arc<dyn EventEmitter> = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;
    let cancel_token = CancellationToken::new();

    let network = create_network_context(&config)?;

    let sonos = Arc::new(SonosClientImpl::new(
        http_client.clone(),
        DiscoveryConfig::from(&config),
    ));
    let topology = Arc::new(TopologyStore::new());
    let state = Arc::new(ControllerState::new(Arc::clone(&emitter)));

    let (gena_manager, gena_event_rx) = GenaSubscriptionManager::new(
        Arc::new(GenaClient::new(http_client)),
        Arc::clone(&topology),
        network.clone(),
        GenaConfig::from(&config),
        spawner.clone(),
        cancel_token.clone(),
    );

    let discovery_service = Arc::new(DiscoveryService::new(
        Arc::clone(&sonos) as Arc<dyn SonosTopologyClient>,
        Arc::clone(&topology),
        gena_manager,
        gena_event_rx,
        Arc::clone(&state),
        Arc::clone(&emitter),
        network.clone(),
        config.topology_refresh(),
        spawner.clone(),
        cancel_token.clone(),
    ));

    let router = Arc::new(CommandRouter::new(
        Arc::clone(&sonos),
        Arc::clone(&topology),
        Arc::clone(&state),
        emitter,
        policy,
        &config.volume,
        spawner.clone(),
    ));

    Ok(Engine {
        config,
        sonos,
        topology,
        state,
        router,
        discovery_service,
        event_bridge,
        network,
        spawner,
        cancel_token,
        started: AtomicBool::new(false),
    })
}
