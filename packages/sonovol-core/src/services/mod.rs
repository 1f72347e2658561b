//! Application services layer.
//!
//! Business logic between the listener and command surfaces on one side and
//! the device protocol layer (`sonos/`) on the other.

pub mod command_router;
pub mod controller_state;
pub mod coordinator_policy;
pub mod discovery_service;
pub mod gena_event_processor;
pub mod topology;
pub mod topology_monitor;
pub mod volume_debouncer;

pub use command_router::CommandRouter;
pub use controller_state::{ControllerSnapshot, ControllerState};
pub use coordinator_policy::{CoordinatorCandidate, CoordinatorPolicy, PriorityPolicy};
pub use discovery_service::DiscoveryService;
pub use gena_event_processor::GenaEventProcessor;
pub use topology::TopologyStore;
pub use topology_monitor::TopologyMonitor;
pub use volume_debouncer::{VolumeDebouncer, VolumeScope, VolumeTarget};
