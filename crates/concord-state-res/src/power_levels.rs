use std::collections::BTreeMap;

use concord_identifiers::UserId;
use serde::{Deserialize, Serialize};

/// `m.room.power_levels` content, per spec §3. Deliberately integer-only —
/// the spec calls this "a rational-number-free table".
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PowerLevels {
    #[serde(default = "default_ban")]
    pub ban: i64,
    #[serde(default = "default_kick")]
    pub kick: i64,
    #[serde(default = "default_redact")]
    pub redact: i64,
    #[serde(default = "default_invite")]
    pub invite: i64,
    #[serde(default)]
    pub events_default: i64,
    #[serde(default = "default_state_default")]
    pub state_default: i64,
    #[serde(default)]
    pub users_default: i64,
    #[serde(default)]
    pub notifications_room: i64,
    #[serde(default)]
    pub events: BTreeMap<String, i64>,
    #[serde(default)]
    pub users: BTreeMap<UserId, i64>,
}

fn default_ban() -> i64 {
    50
}
fn default_kick() -> i64 {
    50
}
fn default_redact() -> i64 {
    50
}
fn default_invite() -> i64 {
    50
}
fn default_state_default() -> i64 {
    50
}

impl Default for PowerLevels {
    fn default() -> Self {
        Self {
            ban: default_ban(),
            kick: default_kick(),
            redact: default_redact(),
            invite: default_invite(),
            events_default: 0,
            state_default: default_state_default(),
            users_default: 0,
            notifications_room: 50,
            events: BTreeMap::new(),
            users: BTreeMap::new(),
        }
    }
}

impl PowerLevels {
    /// The power level required to send an event of `event_type`: the
    /// per-type override if set, else `state_default`/`events_default`
    /// depending on whether it's a state event.
    pub fn event_level(&self, event_type: &str, is_state: bool) -> i64 {
        self.events.get(event_type).copied().unwrap_or(if is_state {
            self.state_default
        } else {
            self.events_default
        })
    }

    /// A user's power level: their explicit entry, else `users_default`.
    /// Does *not* implement the "sole-member creator has infinite power"
    /// special case — that depends on room membership, which `PowerLevels`
    /// alone doesn't know; see `event_auth::effective_power_level`.
    pub fn user_level(&self, user: &UserId) -> i64 {
        self.users.get(user).copied().unwrap_or(self.users_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_user_defaults_to_users_default() {
        let mut levels = PowerLevels::default();
        levels.users_default = 10;
        let bob = UserId::try_from("@bob:example.org").unwrap();
        assert_eq!(levels.user_level(&bob), 10);
    }

    #[test]
    fn per_type_override_wins_over_defaults() {
        let mut levels = PowerLevels::default();
        levels.events.insert("m.room.name".into(), 75);
        assert_eq!(levels.event_level("m.room.name", true), 75);
        assert_eq!(levels.event_level("m.room.topic", true), levels.state_default);
        assert_eq!(levels.event_level("m.room.message", false), levels.events_default);
    }
}
