//! Sonovol Core - local-network speaker control engine.
//!
//! This crate discovers the speakers on the local network, keeps an
//! authoritative view of how they are grouped, sends control actions to the
//! right device, and keeps state current through UPnP event subscriptions.
//! Front ends (the `sonovol` daemon, a hotkey tool, a tray app) sit on top
//! of the [`Engine`](bootstrap::Engine) returned by
//! [`bootstrap_engine`](bootstrap::bootstrap_engine).
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`runtime`]: Task spawning abstraction for async runtime independence
//! - [`events`]: Event system for state-change consumers
//! - [`context`]: Listener port and advertised address
//! - [`state`]: Engine configuration
//! - [`sonos`]: Device discovery, control and eventing (UPnP/SOAP/GENA)
//! - [`services`]: Topology monitoring, event processing, command routing
//! - [`api`]: HTTP listener for event callbacks
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`IpDetector`](context::IpDetector): Local IP detection
//! - [`CoordinatorPolicy`](services::CoordinatorPolicy): Choosing the
//!   surviving coordinator when groups merge
//! - [`SonosClient`](sonos::SonosClient) and its parts: device access

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod context;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod sonos;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use bootstrap::{bootstrap_engine, bootstrap_engine_with_policy, Engine};
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError};
pub use error::{CommandError, CommandResult, CoreError, CoreResult, ErrorCode, UserFacing};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, ControllerEvent, EventEmitter, LoggingEventEmitter,
    NoopEventEmitter, SonosEvent, TopologyEvent,
};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{Config, VolumeConfig};
pub use utils::now_millis;

// Re-export domain types
pub use sonos::discovery::DiscoveredDevice;
pub use sonos::types::{
    Device, Group, NowPlaying, SourceKind, TopologySnapshot, TrackMetadata, TransportState,
};
pub use sonos::{SonosClient, SonosClientImpl, SonosService};

// Re-export service types
pub use services::{
    CommandRouter, ControllerSnapshot, CoordinatorCandidate, CoordinatorPolicy, PriorityPolicy,
};
