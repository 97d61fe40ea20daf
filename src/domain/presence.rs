use serde::{Deserialize, Serialize};

/// A presence value broadcast to other users.
///
/// Connection transitions only ever produce `online` and `offline`, but clients
/// may set any value through `set_status`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceStatus(String);

impl PresenceStatus {
    pub const ONLINE: &'static str = "online";
    pub const OFFLINE: &'static str = "offline";

    #[must_use]
    pub fn online() -> Self {
        Self(Self::ONLINE.to_string())
    }

    #[must_use]
    pub fn offline() -> Self {
        Self(Self::OFFLINE.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PresenceStatus {
    fn from(value: String) -> Self {
        Self(value)
    }
}
