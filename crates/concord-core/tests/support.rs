#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering::SeqCst},
        Mutex,
    },
};

use concord_core::{Direction, EventPage, Result, StorageRepository};
use concord_events::{EventHash, EventType, OriginServerTs, PduEvent};
use concord_identifiers::{EventId, RoomId, UserId};
use concord_state_res::StateMap;
use js_int::UInt;
use serde_json::Value as JsonValue;

static COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn room_id() -> RoomId {
    RoomId::try_from("!room:foo").unwrap()
}

pub fn user(name: &str) -> UserId {
    UserId::try_from(format!("@{name}:foo")).unwrap()
}

/// Builds a `PduEvent` fixture, hashing its own `event_id` from its
/// canonical bytes the way a real client/federation submission would —
/// unlike `concord-state-res`'s fixtures, `submit_event` round-trips events
/// through storage, so a content-addressed id that's actually consistent
/// with the event's own fields matters here.
pub fn pdu(
    room: &RoomId,
    sender: UserId,
    event_type: &str,
    state_key: Option<&str>,
    content: JsonValue,
    auth_events: Vec<EventId>,
    prev_events: Vec<EventId>,
) -> PduEvent {
    let seq = COUNTER.fetch_add(1, SeqCst);
    let depth = UInt::try_from(seq).unwrap();
    let mut event = PduEvent {
        event_id: EventId::try_from(format!("$placeholder{seq}")).unwrap(),
        room_id: room.clone(),
        sender,
        event_type: EventType::from(event_type),
        origin_server_ts: OriginServerTs(depth),
        content,
        state_key: state_key.map(ToOwned::to_owned),
        prev_events,
        auth_events,
        depth,
        redacts: None,
        unsigned: BTreeMap::new(),
        hashes: EventHash::default(),
        signatures: BTreeMap::new(),
    };
    event.event_id = event.compute_event_id();
    event
}

#[derive(Default)]
struct Inner {
    events: std::collections::HashMap<EventId, PduEvent>,
    /// Every snapshot ever published for a room, oldest first; the last
    /// entry is "current".
    snapshots: std::collections::HashMap<RoomId, Vec<(EventId, StateMap<EventId>)>>,
    /// Insertion order of every event seen for a room, for `list_room_events`.
    timeline: std::collections::HashMap<RoomId, Vec<EventId>>,
}

/// An in-process `StorageRepository`: a plain `Mutex`-guarded map standing in
/// for the durable store `concord-core` never specifies a schema for (see
/// `storage.rs`'s own doc comment). Grounded on the same
/// "embedding application supplies persistence" split the teacher's
/// `ruma_state_res::test_utils::TestStore` fixture uses for its own
/// in-memory `Event` lookups.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageRepository for MemoryStorage {
    async fn put_event(&self, event: &PduEvent) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.timeline.entry(event.room_id.clone()).or_default().push(event.event_id.clone());
        inner.events.insert(event.event_id.clone(), event.clone());
        Ok(())
    }

    async fn get_event(&self, _room: &RoomId, event_id: &EventId) -> Result<Option<PduEvent>> {
        Ok(self.inner.lock().unwrap().events.get(event_id).cloned())
    }

    async fn put_state_snapshot(
        &self,
        room: &RoomId,
        snapshot: &StateMap<EventId>,
        at_event: &EventId,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.snapshots.entry(room.clone()).or_default().push((at_event.clone(), snapshot.clone()));
        Ok(())
    }

    async fn load_state_snapshot(
        &self,
        room: &RoomId,
        at_event: Option<&EventId>,
    ) -> Result<Option<StateMap<EventId>>> {
        let inner = self.inner.lock().unwrap();
        let Some(history) = inner.snapshots.get(room) else { return Ok(None) };
        match at_event {
            None => Ok(history.last().map(|(_, snapshot)| snapshot.clone())),
            Some(id) => Ok(history.iter().find(|(eid, _)| eid == id).map(|(_, snapshot)| snapshot.clone())),
        }
    }

    async fn list_room_events(
        &self,
        room: &RoomId,
        since: Option<&EventId>,
        limit: usize,
        dir: Direction,
    ) -> Result<EventPage> {
        let inner = self.inner.lock().unwrap();
        let Some(ids) = inner.timeline.get(room) else {
            return Ok(EventPage { events: Vec::new(), has_more: false });
        };

        let mut ordered: Vec<&EventId> = ids.iter().collect();
        if dir == Direction::Backward {
            ordered.reverse();
        }
        let start = match since {
            None => 0,
            Some(id) => ordered.iter().position(|eid| *eid == id).map(|i| i + 1).unwrap_or(ordered.len()),
        };
        let slice = &ordered[start.min(ordered.len())..];
        let has_more = slice.len() > limit;
        let events = slice.iter().take(limit).filter_map(|id| inner.events.get(*id).cloned()).collect();
        Ok(EventPage { events, has_more })
    }
}
