use crate::domain::event::ServerEvent;
use crate::domain::session::ConnectionId;
use dashmap::DashMap;
use opentelemetry::{KeyValue, global, metrics::Counter};
use tokio::sync::mpsc;

#[derive(Clone, Debug)]
struct Metrics {
    outbound_dropped_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("duet-server");
        Self {
            outbound_dropped_total: meter
                .u64_counter("duet_outbound_dropped_total")
                .with_description("Events dropped because a connection's outbound buffer was full")
                .build(),
        }
    }
}

/// Outcome of handing an event to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Outbound buffer was full; the event is dropped for this connection.
    Dropped,
    /// The connection is gone.
    Gone,
}

/// Every live connection in the process and the channel feeding its socket writer.
///
/// Sends never block: a slow connection loses events instead of stalling the
/// sender, and recovers by re-fetching history.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    metrics: Metrics,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { connections: DashMap::new(), metrics: Metrics::new() }
    }

    pub fn register(&self, id: ConnectionId, outbound: mpsc::Sender<ServerEvent>) {
        self.connections.insert(id, outbound);
    }

    pub fn unregister(&self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    #[must_use]
    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn send(&self, id: ConnectionId, event: ServerEvent) -> Delivery {
        let Some(tx) = self.connections.get(&id).map(|entry| entry.value().clone()) else {
            return Delivery::Gone;
        };
        self.deliver(id, &tx, event)
    }

    /// Sends to every registered connection except `origin`. Returns how many
    /// connections had the event queued.
    pub fn broadcast_except(&self, origin: ConnectionId, event: &ServerEvent) -> usize {
        // Snapshot first so no shard lock is held while delivering.
        let targets: Vec<(ConnectionId, mpsc::Sender<ServerEvent>)> = self
            .connections
            .iter()
            .filter(|entry| *entry.key() != origin)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        targets.into_iter().filter(|(id, tx)| self.deliver(*id, tx, event.clone()) == Delivery::Queued).count()
    }

    fn deliver(&self, id: ConnectionId, tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> Delivery {
        let name = event.name();
        match tx.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %id, event = name, "Outbound buffer full, dropping event");
                self.metrics.outbound_dropped_total.add(1, &[KeyValue::new("event", name)]);
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Gone,
        }
    }
}
