//! Event model, room state, authorization, and state resolution for a
//! Matrix homeserver core — transport, persistence, and federation wire
//! plumbing are out of scope; see `concord-core::StorageRepository` for the
//! seam an embedding application fills in.
//!
//! This crate is a thin façade: the actual implementation lives in
//! `concord-events` (the event model and canonical JSON), `concord-state-res`
//! (authorization and state resolution, pure functions over `Event`), and
//! `concord-core` (the stateful manager, cache, and storage/federation
//! seams). Depend on those directly if you only need one layer.

pub use concord_core as core;
pub use concord_events as events;
pub use concord_identifiers as identifiers;
pub use concord_state_res as state_res;

pub use concord_core::{
    Acceptance, At, CacheConfig, CacheStats, ChangeEvent, Direction, Error, EventPage,
    FederationIngest, Origin, Result, RoomState, RoomSummary, StateDiff, StateManager,
    StateManagerConfig, StorageRepository, Subscription, Subscriptions,
};
pub use concord_events::{compute_event_id, EventHash, EventType, OriginServerTs, PduEvent};
pub use concord_identifiers::{EventId, IdParseError, RoomId, ServerName, UserId};
pub use concord_state_res::{
    auth_chain, auth_types_for_event, authorize, effective_power_level, is_power_event,
    iterative_auth_check, lexicographical_topological_sort, mainline_sort, membership_of, resolve,
    reverse_topological_power_sort, valid_membership_change, AuthRules, AuthRulesV1, Event, EventMap,
    MembershipState, PowerLevels, RoomVersion, StateMap,
};
