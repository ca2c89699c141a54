//! Per-type redaction: which `content` keys survive `PduEvent::redact`.
//!
//! Grounded on the Matrix redaction algorithm as exercised by
//! `ruma_events::room::redaction` (the split between a `v1`-era and
//! `v11`-era preserved-keys table) — we implement the single room-version-"1"
//! table the spec targets, with the hook (`EventType`-keyed match) the spec's
//! design notes ask for so a second table could be added later.

use serde_json::{Map, Value as JsonValue};

use crate::event_type::EventType;

/// Content keys preserved across redaction for a given event type. Anything
/// not listed here is dropped.
fn preserved_keys(event_type: &EventType) -> &'static [&'static str] {
    match event_type.as_str() {
        EventType::ROOM_MEMBER => &["membership"],
        EventType::ROOM_CREATE => &["creator"],
        EventType::ROOM_JOIN_RULES => &["join_rule"],
        EventType::ROOM_POWER_LEVELS => &[
            "ban",
            "events",
            "events_default",
            "kick",
            "redact",
            "state_default",
            "users",
            "users_default",
        ],
        EventType::ROOM_ALIASES => &["aliases"],
        EventType::ROOM_HISTORY_VISIBILITY => &["history_visibility"],
        _ => &[],
    }
}

/// Prunes `content` to only the protocol-preserving fields for `event_type`.
/// Applying this to already-redacted content is a no-op, which is what
/// makes `PduEvent::redact` idempotent (P5).
pub fn redact_content(event_type: &EventType, content: &JsonValue) -> JsonValue {
    let Some(object) = content.as_object() else {
        return JsonValue::Object(Map::new());
    };

    let keep = preserved_keys(event_type);
    let pruned: Map<String, JsonValue> = object
        .iter()
        .filter(|(key, _)| keep.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    JsonValue::Object(pruned)
}
