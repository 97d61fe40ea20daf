use crate::domain::event::ServerEvent;
use crate::domain::session::{ConnectionId, LiveSession};
use crate::services::connection_registry::{ConnectionRegistry, Delivery};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Rooms {
    members: HashMap<Uuid, HashSet<ConnectionId>>,
    joined: HashMap<ConnectionId, HashSet<Uuid>>,
}

/// Tracks which connections are subscribed to which conversation room.
///
/// Rooms exist only while they have members. A connection may sit in any
/// number of rooms; leaving every room happens when it closes.
#[derive(Debug)]
pub struct RoomRouter {
    rooms: Mutex<Rooms>,
    connections: Arc<ConnectionRegistry>,
}

impl RoomRouter {
    #[must_use]
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { rooms: Mutex::new(Rooms::default()), connections }
    }

    fn rooms(&self) -> MutexGuard<'_, Rooms> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes the session's connection to a room. Returns `false` if it
    /// was already a member.
    pub fn join(&self, session: &LiveSession, room_id: Uuid) -> bool {
        let connection_id = session.connection_id();
        let mut rooms = self.rooms();
        let inserted = rooms.members.entry(room_id).or_default().insert(connection_id);
        rooms.joined.entry(connection_id).or_default().insert(room_id);
        if inserted {
            tracing::debug!(%connection_id, room_id = %room_id, "Joined room");
        }
        inserted
    }

    /// Returns `false` if the connection was not in the room.
    pub fn leave(&self, connection_id: ConnectionId, room_id: Uuid) -> bool {
        let mut rooms = self.rooms();
        let removed = Self::remove_member(&mut rooms, room_id, connection_id);
        if let Some(joined) = rooms.joined.get_mut(&connection_id) {
            joined.remove(&room_id);
            if joined.is_empty() {
                rooms.joined.remove(&connection_id);
            }
        }
        removed
    }

    pub fn leave_all(&self, connection_id: ConnectionId) {
        let mut rooms = self.rooms();
        let Some(joined) = rooms.joined.remove(&connection_id) else {
            return;
        };
        for room_id in joined {
            Self::remove_member(&mut rooms, room_id, connection_id);
        }
    }

    fn remove_member(rooms: &mut Rooms, room_id: Uuid, connection_id: ConnectionId) -> bool {
        let Some(members) = rooms.members.get_mut(&room_id) else {
            return false;
        };
        let removed = members.remove(&connection_id);
        if members.is_empty() {
            rooms.members.remove(&room_id);
        }
        removed
    }

    #[must_use]
    pub fn members(&self, room_id: Uuid) -> Vec<ConnectionId> {
        self.rooms().members.get(&room_id).map(|m| m.iter().copied().collect()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_member(&self, connection_id: ConnectionId, room_id: Uuid) -> bool {
        self.rooms().members.get(&room_id).is_some_and(|m| m.contains(&connection_id))
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms().members.len()
    }

    /// Delivers an event to every current member of a room, sender included.
    /// Returns the number of connections the event was queued for.
    pub fn publish(&self, room_id: Uuid, event: &ServerEvent) -> usize {
        let members = self.members(room_id);
        members
            .into_iter()
            .filter(|connection_id| self.connections.send(*connection_id, event.clone()) == Delivery::Queued)
            .count()
    }
}
