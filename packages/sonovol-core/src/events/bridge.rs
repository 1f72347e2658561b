//! Bridge from domain events to the broadcast channel.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::emitter::EventEmitter;
use super::{BroadcastEvent, ControllerEvent, SonosEvent, TopologyEvent};

/// Fans events out to every broadcast subscriber.
///
/// An optional external emitter (a UI front-end, a log sink) receives a copy
/// of each event before it is broadcast. It can be set after construction.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    /// Subscribes as a `Stream`. Lagging consumers see a
    /// `BroadcastStreamRecvError::Lagged` item and continue.
    pub fn stream(&self) -> BroadcastStream<BroadcastEvent> {
        BroadcastStream::new(self.tx.subscribe())
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_sonos, SonosEvent, Sonos);
    impl_emit!(emit_topology, TopologyEvent, Topology);
    impl_emit!(emit_controller, ControllerEvent, Controller);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::emitter::tests::RecordingEmitter;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn bridge_broadcasts_and_forwards() {
        let bridge = BroadcastEventBridge::new(8);
        let external = Arc::new(RecordingEmitter::default());
        bridge.set_external_emitter(external.clone());
        let mut rx = bridge.subscribe();

        bridge.emit_topology(TopologyEvent::NoDevicesFound { timestamp: 7 });

        match rx.recv().await {
            Ok(BroadcastEvent::Topology(TopologyEvent::NoDevicesFound { timestamp })) => {
                assert_eq!(timestamp, 7);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(external.topology.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn emitting_without_receivers_is_fine() {
        let bridge = BroadcastEventBridge::new(8);
        bridge.emit_controller(ControllerEvent::SelectionChanged {
            device_id: None,
            timestamp: 0,
        });
    }
}
