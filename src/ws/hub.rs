use crate::ws::protocol::ServerMessage;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Registry of live subscriber connections and the fan-out primitive.
///
/// Each connection gets its own unbounded queue, drained by a single sender
/// task, so emission order is preserved per connection. All registry
/// mutations go through one lock; no other component touches the map.
#[derive(Debug, Default)]
pub struct Hub {
    connections: Mutex<HashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new subscriber. Returns its connection id and the receiving
    /// end of its event queue.
    pub fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.lock().unwrap().insert(id, tx);
        debug!(connection_id = %id, "subscriber registered");
        (id, rx)
    }

    /// Remove a subscriber. Unregistering an id that is already gone is a
    /// no-op, so disconnect paths do not have to coordinate.
    pub fn unregister(&self, id: Uuid) {
        let removed = self.connections.lock().unwrap().remove(&id).is_some();
        if removed {
            debug!(connection_id = %id, "subscriber unregistered");
        }
    }

    /// Push an event to every registered connection, best-effort. A
    /// connection whose queue has closed is skipped; its entry is cleaned up
    /// by the owning connection task, not from here. Returns how many
    /// connections the event was queued for.
    pub fn broadcast(&self, msg: &ServerMessage) -> usize {
        let connections = self.connections.lock().unwrap();

        let mut delivered = 0;
        for (id, tx) in connections.iter() {
            if tx.send(msg.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!(connection_id = %id, "subscriber queue closed; skipping delivery");
            }
        }
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}
