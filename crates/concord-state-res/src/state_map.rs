use std::collections::BTreeMap;

use concord_events::EventType;
use concord_identifiers::EventId;

/// A room state snapshot: `(event_type, state_key) → V`, as described in
/// spec §3's `RoomState`. Generic over `V` the way `ruma_state_res::StateMap`
/// is, so callers can hold either `EventId`s (the wire representation) or
/// resolved `Arc<dyn Event>`s (what the resolution algorithm works with
/// internally).
pub type StateMap<V> = BTreeMap<(EventType, String), V>;

/// `event_id → event`, the event arena spec §9 calls for: events are flat
/// records in a room-scoped map, referenced by id, never by pointer back
/// into the DAG.
pub type EventMap<E> = BTreeMap<EventId, E>;
