use std::collections::BTreeMap;

use concord_identifiers::{EventId, RoomId, UserId};
use js_int::UInt;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    canonical_json::{canonical_bytes_excluding, CanonicalJsonObject},
    error::Error,
    event_type::EventType,
};

/// Milliseconds since the Unix epoch, as carried in `origin_server_ts`.
/// Mirrors `ruma_common::MilliSecondsSinceUnixEpoch`'s non-negative,
/// `js_int`-backed representation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginServerTs(pub UInt);

/// Content hash of an event's canonical form, excluding signatures.
/// Distinct from `event_id`: this is the `hashes` field carried *inside*
/// the event, not the id computed over it.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct EventHash {
    pub sha256: String,
}

/// A persistent data unit: the atomic, content-addressed event record
/// described in spec §3. Fields beyond the common header are an opaque
/// `content` object, inspected by typed accessors (`redaction::*`,
/// `concord_state_res::power_levels`) rather than a deep type hierarchy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PduEvent {
    pub event_id: EventId,
    pub room_id: RoomId,
    pub sender: UserId,
    pub event_type: EventType,
    pub origin_server_ts: OriginServerTs,
    pub content: JsonValue,
    /// Present iff this is a state event.
    pub state_key: Option<String>,
    pub prev_events: Vec<EventId>,
    pub auth_events: Vec<EventId>,
    pub depth: UInt,
    /// Set only on `m.room.redaction` events: the event being redacted.
    pub redacts: Option<EventId>,
    #[serde(default)]
    pub unsigned: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub hashes: EventHash,
    #[serde(default)]
    pub signatures: BTreeMap<String, BTreeMap<String, String>>,
}

/// Event-type families for which a `state_key` is a structural error:
/// they are always timeline events. A more thorough implementation would
/// invert this (a closed list of state types) but Matrix intentionally
/// keeps the type namespace open, so we only reject the unambiguous cases.
const TIMELINE_ONLY_TYPES: &[&str] =
    &[EventType::ROOM_MESSAGE, EventType::ROOM_REDACTION];

impl PduEvent {
    /// `is_state(event) = event.state_key.is_present()`.
    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// `(event_type, state_key)`, for state events only.
    pub fn state_map_key(&self) -> Option<(EventType, String)> {
        self.state_key.clone().map(|key| (self.event_type.clone(), key))
    }

    /// Deserializes `content` into a typed view. Returns `None` on schema
    /// mismatch rather than erroring: callers treat an unparseable content
    /// object as "this event doesn't have that facet" (e.g. `as_member()`
    /// on a non-membership event).
    pub fn content_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.content.clone()).ok()
    }

    /// Deterministic byte encoding used for `event_id` hashing: the event
    /// minus `unsigned`, `signatures`, `hashes`, and `event_id` itself,
    /// key-sorted. `parse(canonical_bytes(e)) = e` holds because every
    /// field this excludes is either derived (`event_id`) or round-trips
    /// through `unsigned`/`signatures`/`hashes` untouched.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let object = self.to_canonical_object();
        canonical_bytes_excluding(&object, &["event_id", "unsigned", "signatures", "hashes"])
    }

    fn to_canonical_object(&self) -> CanonicalJsonObject {
        let value = serde_json::to_value(self).expect("PduEvent always serializes");
        value.try_into().map(|v: crate::canonical_json::CanonicalJsonValue| {
            v.as_object().cloned().expect("event serializes to an object")
        }).expect("event content is canonicalizable")
    }

    /// `event_id(event) = hash(canonical_bytes(event))`: SHA-256 of the
    /// canonical bytes, base64url-encoded with no padding, `$`-prefixed.
    /// Grounded on the hashing primitives `ruma-signatures` uses
    /// (`ring::digest` + `base64`) for the same Matrix content-hash scheme.
    pub fn compute_event_id(&self) -> EventId {
        compute_event_id(&self.canonical_bytes())
    }

    /// Produces a redacted copy: only protocol-preserving fields survive,
    /// `content` is pruned per `redaction::redact_content`, and `redacts`
    /// is threaded through on `m.room.redaction` events.
    pub fn redact(&self, redacted_by: EventId) -> Self {
        let mut redacted = self.clone();
        redacted.content = crate::redaction::redact_content(&self.event_type, &self.content);
        redacted.unsigned.insert(
            "redacted_because".into(),
            serde_json::json!({ "event_id": redacted_by.to_string() }),
        );
        redacted
    }

    /// Parses and structurally validates a raw JSON event, per §4.1's
    /// `MalformedEvent` failure mode.
    pub fn parse(value: JsonValue) -> Result<Self, Error> {
        let event: Self = serde_json::from_value(value)?;
        event.validate()?;
        Ok(event)
    }

    /// Structural validation applied to every parsed event (spec §4.1's
    /// `MalformedEvent` failure mode), re-run by the state manager for
    /// events supplied directly as [`PduEvent`] rather than raw JSON.
    pub fn validate(&self) -> Result<(), Error> {
        if self.state_key.is_some() && TIMELINE_ONLY_TYPES.contains(&self.event_type.as_str()) {
            return Err(Error::MalformedEvent("state_key on a timeline-only event type"));
        }
        if self.event_type.as_str() == EventType::ROOM_REDACTION && self.redacts.is_none() {
            return Err(Error::MalformedEvent("m.room.redaction without redacts"));
        }
        Ok(())
    }
}

/// `$<base64url-no-pad(sha256(canonical_bytes))>`, per spec §6.
pub fn compute_event_id(canonical_bytes: &[u8]) -> EventId {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    let digest = ring::digest::digest(&ring::digest::SHA256, canonical_bytes);
    let encoded = URL_SAFE_NO_PAD.encode(digest.as_ref());
    EventId::try_from(format!("${encoded}")).expect("hash-derived event ids are always valid")
}
