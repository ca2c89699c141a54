//! `RoomState`: spec §4.3's immutable snapshot contract. Grounded on
//! `include/matrix/core/room/room_state.hpp`'s `get`/`apply`/`diff` trio and
//! `ruma_state_res::StateMap`'s shape.

use std::{collections::BTreeSet, sync::Arc};

use concord_events::EventType;
use concord_identifiers::{EventId, RoomId, UserId};
use concord_state_res::{
    effective_power_level, membership_of, Event, EventMap, MembershipState, PowerLevels, StateMap,
};

use crate::error::{Error, Result};

/// The result of comparing two snapshots: what `other` added, what it
/// replaced (old id, new id), and what it removed relative to `self`.
#[derive(Clone, Debug, Default)]
pub struct StateDiff {
    pub added: StateMap<EventId>,
    pub replaced: std::collections::BTreeMap<(EventType, String), (EventId, EventId)>,
    pub removed: BTreeSet<(EventType, String)>,
}

/// An immutable room state snapshot: `(event_type, state_key) → event_id`
/// (spec §3). Always non-empty for a live room — constructing one from an
/// empty map is legal only for the not-yet-created-room case internal to
/// the manager.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RoomState {
    entries: StateMap<EventId>,
}

impl RoomState {
    pub fn empty() -> Self {
        Self { entries: StateMap::new() }
    }

    pub fn from_entries(entries: StateMap<EventId>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &StateMap<EventId> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `get(type, state_key) → event_id?`.
    pub fn get(&self, event_type: &EventType, state_key: &str) -> Option<&EventId> {
        self.entries.get(&(event_type.clone(), state_key.to_owned()))
    }

    /// `apply(event) → new_snapshot`. Total: the only checks performed are
    /// structural (spec §4.3 — "enforces only structural invariants"), not
    /// authorization, which callers run beforehand.
    pub fn apply(&self, room: &RoomId, event: &dyn Event) -> Result<Self> {
        if event.room_id() != room {
            return Err(Error::MalformedEvent(format!(
                "event {} belongs to room {}, not {room}",
                event.event_id(),
                event.room_id()
            )));
        }
        let Some(state_key) = event.state_key() else {
            return Err(Error::MalformedEvent(format!(
                "event {} is not a state event",
                event.event_id()
            )));
        };

        let mut entries = self.entries.clone();
        entries.insert((event.event_type().clone(), state_key.to_owned()), event.event_id().clone());
        Ok(Self { entries })
    }

    /// `diff(other) → {added, replaced, removed}`, read as "what changed
    /// going from `self` to `other`".
    pub fn diff(&self, other: &Self) -> StateDiff {
        let mut diff = StateDiff::default();

        for (key, new_id) in &other.entries {
            match self.entries.get(key) {
                None => {
                    diff.added.insert(key.clone(), new_id.clone());
                }
                Some(old_id) if old_id != new_id => {
                    diff.replaced.insert(key.clone(), (old_id.clone(), new_id.clone()));
                }
                Some(_) => {}
            }
        }
        for key in self.entries.keys() {
            if !other.entries.contains_key(key) {
                diff.removed.insert(key.clone());
            }
        }

        diff
    }

    fn resolve<'a>(&self, event_map: &'a EventMap<Arc<dyn Event>>) -> StateMap<Arc<dyn Event>> {
        self.entries
            .iter()
            .filter_map(|(key, id)| event_map.get(id).map(|e| (key.clone(), Arc::clone(e))))
            .collect::<StateMap<Arc<dyn Event>>>()
    }

    /// `members(membership) → iterator<user_id>`.
    pub fn members(&self, membership: MembershipState, event_map: &EventMap<Arc<dyn Event>>) -> Vec<UserId> {
        self.entries
            .iter()
            .filter(|((event_type, _), _)| event_type.as_str() == EventType::ROOM_MEMBER)
            .filter_map(|(_, id)| event_map.get(id))
            .filter_map(|event| {
                let state_key = event.state_key()?;
                (membership_of(event.content()) == Some(membership))
                    .then(|| UserId::try_from(state_key).ok())
                    .flatten()
            })
            .collect()
    }

    pub fn power_levels(&self, event_map: &EventMap<Arc<dyn Event>>) -> PowerLevels {
        self.entries
            .get(&(EventType::from(EventType::ROOM_POWER_LEVELS), String::new()))
            .and_then(|id| event_map.get(id))
            .and_then(|event| serde_json::from_value(event.content().clone()).ok())
            .unwrap_or_default()
    }

    pub fn user_power_level(&self, user: &UserId, event_map: &EventMap<Arc<dyn Event>>) -> i64 {
        effective_power_level(&self.resolve(event_map), user)
    }
}
