use concord_events::{EventType, OriginServerTs, PduEvent};
use concord_identifiers::{EventId, RoomId, UserId};
use js_int::UInt;
use serde_json::Value as JsonValue;

/// The view of an event that the authorization engine and state-resolution
/// algorithm need. A trait (rather than operating on `PduEvent` directly) so
/// callers can resolve over whatever in-memory representation they already
/// hold — a store-backed wrapper, a test fixture, or `PduEvent` itself.
///
/// Grounded on `ruma_state_res::Event`, whose test-suite implementation
/// (`StateEvent`) this crate's own `tests/` adapt.
pub trait Event: Send + Sync {
    fn event_id(&self) -> &EventId;
    fn room_id(&self) -> &RoomId;
    fn sender(&self) -> &UserId;
    fn event_type(&self) -> &EventType;
    fn content(&self) -> &JsonValue;
    fn origin_server_ts(&self) -> OriginServerTs;
    fn state_key(&self) -> Option<&str>;
    fn prev_events(&self) -> &[EventId];
    fn auth_events(&self) -> &[EventId];
    fn depth(&self) -> UInt;
    fn redacts(&self) -> Option<&EventId>;

    /// `true` for every state event; state-resolution's power-event
    /// classification further narrows this.
    fn is_state(&self) -> bool {
        self.state_key().is_some()
    }
}

impl Event for PduEvent {
    fn event_id(&self) -> &EventId {
        &self.event_id
    }

    fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    fn sender(&self) -> &UserId {
        &self.sender
    }

    fn event_type(&self) -> &EventType {
        &self.event_type
    }

    fn content(&self) -> &JsonValue {
        &self.content
    }

    fn origin_server_ts(&self) -> OriginServerTs {
        self.origin_server_ts
    }

    fn state_key(&self) -> Option<&str> {
        self.state_key.as_deref()
    }

    fn prev_events(&self) -> &[EventId] {
        &self.prev_events
    }

    fn auth_events(&self) -> &[EventId] {
        &self.auth_events
    }

    fn depth(&self) -> UInt {
        self.depth
    }

    fn redacts(&self) -> Option<&EventId> {
        self.redacts.as_ref()
    }
}
