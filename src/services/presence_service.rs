use crate::domain::event::{ServerEvent, StatusChangePayload};
use crate::domain::presence::PresenceStatus;
use crate::domain::session::LiveSession;
use crate::services::connection_registry::ConnectionRegistry;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    broadcasts_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("duet-server");
        Self {
            broadcasts_total: meter
                .u64_counter("duet_presence_broadcasts_total")
                .with_description("Presence status changes fanned out to live connections")
                .build(),
        }
    }
}

/// Online state per user, derived from how many live sessions are bound to them.
///
/// `online` goes out when a user's first session binds and `offline` when the
/// last one closes, so a second device does not flap the status.
///
/// A transition takes the fan-out lock before it releases the count lock, so
/// announcements leave in the order the counts changed. Lookups and count
/// updates that announce nothing only wait for the count lock.
#[derive(Debug)]
pub struct PresenceService {
    sessions: Mutex<HashMap<Uuid, usize>>,
    fanout: Mutex<()>,
    connections: Arc<ConnectionRegistry>,
    metrics: Metrics,
}

impl PresenceService {
    #[must_use]
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), fanout: Mutex::new(()), connections, metrics: Metrics::new() }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, usize>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swaps the count lock for the fan-out lock without a gap between them.
    fn hand_off(&self, sessions: MutexGuard<'_, HashMap<Uuid, usize>>) -> MutexGuard<'_, ()> {
        let fanout = self.fanout.lock().unwrap_or_else(PoisonError::into_inner);
        drop(sessions);
        fanout
    }

    pub fn session_opened(&self, session: &LiveSession) {
        let mut sessions = self.sessions();
        let count = sessions.entry(session.user_id()).or_insert(0);
        *count += 1;
        if *count == 1 {
            let _fanout = self.hand_off(sessions);
            self.announce(session, PresenceStatus::online());
        }
    }

    pub fn session_closed(&self, session: &LiveSession) {
        let mut sessions = self.sessions();
        let Some(count) = sessions.get_mut(&session.user_id()) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            sessions.remove(&session.user_id());
            let _fanout = self.hand_off(sessions);
            self.announce(session, PresenceStatus::offline());
        }
    }

    /// Broadcasts a client-chosen status. Session counts are untouched.
    pub fn set_status(&self, session: &LiveSession, status: PresenceStatus) {
        let _fanout = self.hand_off(self.sessions());
        self.announce(session, status);
    }

    /// Fans out through `try_send`, which never waits on a slow connection.
    fn announce(&self, session: &LiveSession, status: PresenceStatus) {
        let label = KeyValue::new("status", status.as_str().to_owned());
        let event = ServerEvent::UserStatusChange(StatusChangePayload { user_id: session.user_id(), status });
        let delivered = self.connections.broadcast_except(session.connection_id(), &event);
        self.metrics.broadcasts_total.add(1, &[label]);
        tracing::debug!(user_id = %session.user_id(), delivered, "Presence broadcast");
    }

    #[must_use]
    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.sessions().contains_key(&user_id)
    }

    #[must_use]
    pub fn online_users(&self) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = self.sessions().keys().copied().collect();
        users.sort_unstable();
        users
    }
}
