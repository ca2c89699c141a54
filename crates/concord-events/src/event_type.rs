use std::fmt;

use serde::{Deserialize, Serialize};

/// The `type` field of an event. Kept as an opaque, newtype-wrapped string
/// rather than a closed enum: the core must accept event types it doesn't
/// know the content schema for (custom/unstable types), the same way
/// `ruma_events::EventType` stays open via a `_Custom` variant. Well-known
/// kinds get associated constants for ergonomic matching.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    pub const ROOM_CREATE: &'static str = "m.room.create";
    pub const ROOM_MEMBER: &'static str = "m.room.member";
    pub const ROOM_POWER_LEVELS: &'static str = "m.room.power_levels";
    pub const ROOM_JOIN_RULES: &'static str = "m.room.join_rules";
    pub const ROOM_NAME: &'static str = "m.room.name";
    pub const ROOM_TOPIC: &'static str = "m.room.topic";
    pub const ROOM_AVATAR: &'static str = "m.room.avatar";
    pub const ROOM_ALIASES: &'static str = "m.room.aliases";
    pub const ROOM_CANONICAL_ALIAS: &'static str = "m.room.canonical_alias";
    pub const ROOM_HISTORY_VISIBILITY: &'static str = "m.room.history_visibility";
    pub const ROOM_GUEST_ACCESS: &'static str = "m.room.guest_access";
    pub const ROOM_ENCRYPTION: &'static str = "m.room.encryption";
    pub const ROOM_THIRD_PARTY_INVITE: &'static str = "m.room.third_party_invite";
    pub const ROOM_REDACTION: &'static str = "m.room.redaction";
    pub const ROOM_MESSAGE: &'static str = "m.room.message";

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_state_only(&self) -> bool {
        matches!(
            self.0.as_str(),
            Self::ROOM_CREATE
                | Self::ROOM_MEMBER
                | Self::ROOM_POWER_LEVELS
                | Self::ROOM_JOIN_RULES
                | Self::ROOM_NAME
                | Self::ROOM_TOPIC
                | Self::ROOM_AVATAR
                | Self::ROOM_ALIASES
                | Self::ROOM_CANONICAL_ALIAS
                | Self::ROOM_HISTORY_VISIBILITY
                | Self::ROOM_GUEST_ACCESS
                | Self::ROOM_ENCRYPTION
                | Self::ROOM_THIRD_PARTY_INVITE
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for EventType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
