use std::fmt;
use uuid::Uuid;

/// Identifies one live transport connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Binding of one connection to an authenticated user.
///
/// Only the identity service hands these out, so holding one proves the
/// connection completed the authenticate handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSession {
    connection_id: ConnectionId,
    user_id: Uuid,
}

impl LiveSession {
    pub(crate) const fn bind(connection_id: ConnectionId, user_id: Uuid) -> Self {
        Self { connection_id, user_id }
    }

    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    #[must_use]
    pub const fn user_id(&self) -> Uuid {
        self.user_id
    }
}
