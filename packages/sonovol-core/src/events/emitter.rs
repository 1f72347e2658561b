//! Event emitter abstraction.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, so they can be tested with counting emitters and embedded under
//! other front-ends.

use super::{ControllerEvent, SonosEvent, TopologyEvent};

/// Trait for emitting domain events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a device notification event.
    fn emit_sonos(&self, event: SonosEvent);

    /// Emits a topology event.
    fn emit_topology(&self, event: TopologyEvent);

    /// Emits a controller state event.
    fn emit_controller(&self, event: ControllerEvent);
}

/// Discards every event.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_sonos(&self, _event: SonosEvent) {}

    fn emit_topology(&self, _event: TopologyEvent) {}

    fn emit_controller(&self, _event: ControllerEvent) {}
}

/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_sonos(&self, event: SonosEvent) {
        tracing::debug!(?event, "sonos_event");
    }

    fn emit_topology(&self, event: TopologyEvent) {
        tracing::debug!(?event, "topology_event");
    }

    fn emit_controller(&self, event: ControllerEvent) {
        tracing::debug!(?event, "controller_event");
    }
}
