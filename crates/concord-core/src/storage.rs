//! The collaborator-facing side of spec §6: traits the core *consumes*.
//! `concord-core` never specifies a database schema — a `StorageRepository`
//! implementation is supplied by the embedding application (the same split
//! `original_source`'s `storage::Repository` interface and `tuwunel`'s
//! `service::Services` draw between the core and its persistence layer).

use std::future::Future;

use concord_events::PduEvent;
use concord_identifiers::{EventId, RoomId};
use concord_state_res::{EventMap, StateMap};

use crate::error::Result;

/// Direction for [`StorageRepository::list_room_events`] paging.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A page of events from [`StorageRepository::list_room_events`], plus
/// whether more remain beyond `limit`.
#[derive(Clone, Debug)]
pub struct EventPage {
    pub events: Vec<PduEvent>,
    pub has_more: bool,
}

/// The durable sink the state manager writes through and reads from.
/// `put_event`/`put_state_snapshot` are required to be durable-before-ack
/// (spec §6) — the manager awaits them before publishing to subscribers.
pub trait StorageRepository: Send + Sync + 'static {
    fn put_event(&self, event: &PduEvent) -> impl Future<Output = Result<()>> + Send;

    fn get_event(
        &self,
        room: &RoomId,
        event_id: &EventId,
    ) -> impl Future<Output = Result<Option<PduEvent>>> + Send;

    fn put_state_snapshot(
        &self,
        room: &RoomId,
        snapshot: &StateMap<EventId>,
        at_event: &EventId,
    ) -> impl Future<Output = Result<()>> + Send;

    fn load_state_snapshot(
        &self,
        room: &RoomId,
        at_event: Option<&EventId>,
    ) -> impl Future<Output = Result<Option<StateMap<EventId>>>> + Send;

    fn list_room_events(
        &self,
        room: &RoomId,
        since: Option<&EventId>,
        limit: usize,
        dir: Direction,
    ) -> impl Future<Output = Result<EventPage>> + Send;
}

/// An in-process event arena: the flat, room-scoped record store spec §9
/// calls for ("events as flat records... referenced by id, never a pointer
/// back into the graph"). Kept separate from `StorageRepository` because the
/// manager needs synchronous, already-resolved `Arc<dyn Event>` lookups
/// mid-authorization — it's a cache of what storage holds, not storage
/// itself.
pub(crate) type RoomEventArena = EventMap<std::sync::Arc<dyn concord_state_res::Event>>;
