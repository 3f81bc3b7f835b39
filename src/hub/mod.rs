//! Component (F): the push hub. Broadcasts are global across every stream's
//! subscribers, via a single process-wide broadcast channel (§9 "Global vs.
//! per-stream broadcast" — kept, documented in DESIGN.md).

pub mod connection;
pub mod protocol;

pub use connection::HubConnection;
pub use protocol::{ClientMessage, ServerMessage};

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 1024;

/// Identifies one live hub connection, used to exclude the sender from its
/// own `SendMetrics` fan-out (§4.F).
pub type ConnId = u64;

#[derive(Clone, Debug)]
pub struct HubEvent {
    /// `Some(id)` restricts delivery to every connection except `id`
    /// (`SendMetrics`); `None` is a normal all-subscriber broadcast.
    pub exclude: Option<ConnId>,
    pub message: ServerMessage,
}

/// Process-wide singleton fanning derived-state changes to every connected
/// client (§5 "Shared-resource policy").
pub struct Hub {
    tx: broadcast::Sender<HubEvent>,
    next_id: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new connection and returns its id plus a receiver for
    /// every broadcast it should see.
    pub fn register(&self) -> (ConnId, broadcast::Receiver<HubEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        (id, self.tx.subscribe())
    }

    /// Broadcasts to every subscriber (projector-driven updates and the
    /// append route's direct notifications).
    pub fn broadcast(&self, kind: &str, payload: Value) {
        let _ = self.tx.send(HubEvent {
            exclude: None,
            message: ServerMessage::new(kind, payload),
        });
    }

    /// Broadcasts to every subscriber except `origin` (`SendMetrics`, §9
    /// "broadcasts to Others — excludes sender. Keep this.").
    pub fn broadcast_except(&self, origin: ConnId, kind: &str, payload: Value) {
        let _ = self.tx.send(HubEvent {
            exclude: Some(origin),
            message: ServerMessage::new(kind, payload),
        });
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
