//! The authorization engine: `authorize(event, state, auth_events) →
//! {allowed | denied(reason)}`, per spec §4.2. A pure predicate — it never
//! mutates `state`, only reads it.
//!
//! Grounded on `ruma_state_res::event_auth` (`valid_membership_change`,
//! the auth-event well-formedness checks) and the membership-transition
//! table the test fixtures in `ruma-state-res/tests/event_auth.rs` exercise
//! (`test_ban_pass`/`test_ban_fail`).

use std::sync::Arc;

use concord_events::EventType;
use concord_identifiers::UserId;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{
    error::{Error, Result},
    event::Event,
    power_levels::PowerLevels,
    state_map::StateMap,
};

/// `m.room.member`'s `membership` values, per the GLOSSARY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipState {
    Join,
    Invite,
    Leave,
    Ban,
    Knock,
}

#[derive(Deserialize)]
struct MemberContent {
    membership: MembershipState,
}

/// Reads the `membership` field out of an `m.room.member` event's content.
/// `None` if the content doesn't parse as a membership payload.
pub fn membership_of(content: &JsonValue) -> Option<MembershipState> {
    serde_json::from_value::<MemberContent>(content.clone()).ok().map(|c| c.membership)
}

/// The room-version-parameterized rule-set hook spec §9 asks for. Object
/// safe (all `Event` methods are) so a `&dyn AuthRules` can be selected at
/// runtime from `RoomVersion::rules`.
pub trait AuthRules {
    /// Runs the full ordered rule chain from spec §4.2 against an event.
    /// `redacted_event_sender` is only consulted for `m.room.redaction`
    /// events (rule 7's "or be the original sender" clause) and is the
    /// caller's responsibility to look up via the storage repository,
    /// since the redacted event isn't necessarily in `auth_events`.
    fn authorize(
        &self,
        event: &dyn Event,
        state: &StateMap<Arc<dyn Event>>,
        auth_events: &StateMap<Arc<dyn Event>>,
        redacted_event_sender: Option<&UserId>,
    ) -> Result<()>;
}

/// The one rule-set this workspace ships (spec Non-goals: "pluggable
/// authorization policies" beyond this hook are out of scope).
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthRulesV1;

impl AuthRules for AuthRulesV1 {
    fn authorize(
        &self,
        event: &dyn Event,
        state: &StateMap<Arc<dyn Event>>,
        auth_events: &StateMap<Arc<dyn Event>>,
        redacted_event_sender: Option<&UserId>,
    ) -> Result<()> {
        authorize(event, state, auth_events, redacted_event_sender)
    }
}

/// The `(event_type, state_key)` pairs an event of this shape must cite in
/// its `auth_events`: the create event, the power-levels event, the
/// sender's own membership, and — for membership changes — the target's
/// current membership. Grounded on `ruma_state_res::auth_types_for_event`.
pub fn auth_types_for_event(
    event_type: &EventType,
    sender: &UserId,
    state_key: Option<&str>,
    content: &JsonValue,
) -> Vec<(EventType, String)> {
    if event_type.as_str() == EventType::ROOM_CREATE {
        return vec![];
    }

    let mut auth_types = vec![
        (EventType::from(EventType::ROOM_CREATE), "".to_owned()),
        (EventType::from(EventType::ROOM_POWER_LEVELS), "".to_owned()),
        (EventType::from(EventType::ROOM_MEMBER), sender.to_string()),
    ];

    if event_type.as_str() == EventType::ROOM_MEMBER {
        if let (Some(target), Some(membership)) = (state_key, membership_of(content)) {
            auth_types.push((EventType::from(EventType::ROOM_MEMBER), target.to_owned()));
            if matches!(membership, MembershipState::Join | MembershipState::Invite) {
                auth_types.push((EventType::from(EventType::ROOM_JOIN_RULES), "".to_owned()));
            }
        }
    }

    auth_types
}

/// Power events are the ones state resolution's reverse-topological sort
/// (spec §4.4 step 4) orders and re-authorizes first: room creation,
/// power levels, join rules, and membership changes that affect power
/// (bans and kicks by someone other than the target).
pub fn is_power_event(event: &dyn Event) -> bool {
    match event.event_type().as_str() {
        EventType::ROOM_POWER_LEVELS | EventType::ROOM_JOIN_RULES | EventType::ROOM_CREATE => {
            event.state_key() == Some("")
        }
        EventType::ROOM_MEMBER => {
            if let Some(membership) = membership_of(event.content()) {
                if matches!(membership, MembershipState::Leave | MembershipState::Ban) {
                    return Some(event.sender().as_str()) != event.state_key();
                }
            }
            false
        }
        _ => false,
    }
}

fn power_levels_from_state(state: &StateMap<Arc<dyn Event>>) -> PowerLevels {
    state
        .get(&(EventType::from(EventType::ROOM_POWER_LEVELS), String::new()))
        .and_then(|event| serde_json::from_value(event.content().clone()).ok())
        .unwrap_or_default()
}

/// A user's effective power level in `state`: their `PowerLevels` entry,
/// except the room creator has unbounded power before any
/// `m.room.power_levels` event has been established (spec §3,
/// `PowerLevels`: "creator = infinite power while it is the only member" —
/// the room's very first moments, before a power-levels event exists to
/// record levels explicitly, which is exactly the bootstrap case this
/// exemption exists for: without it, the creator couldn't author the
/// room's first `m.room.power_levels` event, since `levels.user_level`
/// alone would give them only `users_default`).
pub fn effective_power_level(state: &StateMap<Arc<dyn Event>>, user: &UserId) -> i64 {
    let levels = power_levels_from_state(state);

    let has_power_levels_event =
        state.contains_key(&(EventType::from(EventType::ROOM_POWER_LEVELS), String::new()));

    let is_creator = state
        .get(&(EventType::from(EventType::ROOM_CREATE), String::new()))
        .and_then(|event| event.content().get("creator"))
        .and_then(JsonValue::as_str)
        .is_some_and(|creator| creator == user.as_str());

    if is_creator && !has_power_levels_event {
        i64::MAX
    } else {
        levels.user_level(user)
    }
}

/// Rule 4: is `from → to` a structurally valid membership transition, and
/// is the sender privileged enough to cause it? Mirrors
/// `ruma_state_res::event_auth::valid_membership_change`'s signature and
/// the ban/kick power-level comparisons its test fixtures pin down.
pub fn valid_membership_change(
    target: &str,
    sender: &UserId,
    content: &JsonValue,
    state: &StateMap<Arc<dyn Event>>,
) -> Result<bool> {
    let Some(to) = membership_of(content) else {
        return Ok(false);
    };

    let from = state
        .get(&(EventType::from(EventType::ROOM_MEMBER), target.to_owned()))
        .and_then(|event| membership_of(event.content()));

    let levels = power_levels_from_state(state);
    let target_id = match UserId::try_from(target) {
        Ok(id) => id,
        Err(_) => return Ok(false),
    };
    let sender_level = effective_power_level(state, sender);
    let target_level = effective_power_level(state, &target_id);

    let join_rule_is_public = state
        .get(&(EventType::from(EventType::ROOM_JOIN_RULES), String::new()))
        .and_then(|event| event.content().get("join_rule"))
        .and_then(JsonValue::as_str)
        == Some("public");

    let is_self = sender.as_str() == target;

    let allowed = match (from, to) {
        (None, MembershipState::Join) => is_self && join_rule_is_public,
        (None, MembershipState::Invite) => sender_level >= levels.invite,
        (None, MembershipState::Ban) => sender_level >= levels.ban,
        // `knock_rule` isn't modeled as a distinct join-rule value; closed by default.
        (None, MembershipState::Knock) => false,
        (None, MembershipState::Leave) => is_self,

        (Some(MembershipState::Invite), MembershipState::Join) => is_self,
        (Some(MembershipState::Invite), MembershipState::Invite) => sender_level >= levels.invite,
        (Some(MembershipState::Invite), MembershipState::Leave) => {
            is_self || (sender_level >= levels.kick && sender_level > target_level)
        }
        (Some(MembershipState::Invite), MembershipState::Ban) => sender_level >= levels.ban,

        (Some(MembershipState::Join), MembershipState::Join) => is_self,
        (Some(MembershipState::Join), MembershipState::Leave) => {
            is_self || (sender_level >= levels.kick && sender_level > target_level)
        }
        (Some(MembershipState::Join), MembershipState::Ban) => {
            sender_level >= levels.ban && sender_level > target_level
        }

        (Some(MembershipState::Leave), MembershipState::Join) => is_self && join_rule_is_public,
        (Some(MembershipState::Leave), MembershipState::Invite) => sender_level >= levels.invite,
        (Some(MembershipState::Leave), MembershipState::Leave) => is_self,
        (Some(MembershipState::Leave), MembershipState::Ban) => sender_level >= levels.ban,

        (Some(MembershipState::Ban), MembershipState::Ban) => is_self,
        (Some(MembershipState::Ban), MembershipState::Leave) => sender_level >= levels.ban,

        _ => false,
    };

    Ok(allowed)
}

/// The full ordered rule chain from spec §4.2.
pub fn authorize(
    event: &dyn Event,
    state: &StateMap<Arc<dyn Event>>,
    auth_events: &StateMap<Arc<dyn Event>>,
    redacted_event_sender: Option<&UserId>,
) -> Result<()> {
    // Rule 1: create events.
    if event.event_type().as_str() == EventType::ROOM_CREATE {
        if !state.is_empty() {
            return Err(Error::AuthFailed { rule: "create-room-not-empty" });
        }
        if event.state_key() != Some("") {
            return Err(Error::AuthFailed { rule: "create-bad-state-key" });
        }
        let creator_matches = event
            .content()
            .get("creator")
            .and_then(JsonValue::as_str)
            .is_some_and(|creator| creator == event.sender().as_str());
        if !creator_matches {
            return Err(Error::AuthFailed { rule: "create-sender-not-creator" });
        }
        return Ok(());
    }

    // Rule 2: auth-event well-formedness. Only types that actually have a
    // value in the current room state are required: a type with no prior
    // state (e.g. a user's own member event, before their first join) has
    // nothing to cite, so its absence from `auth_events` is not an error.
    let expected_types =
        auth_types_for_event(event.event_type(), event.sender(), event.state_key(), event.content());
    for key in &expected_types {
        if state.contains_key(key) && !auth_events.contains_key(key) {
            return Err(Error::AuthFailed { rule: "auth-events-missing" });
        }
    }
    // The other half of well-formedness: every type an event actually
    // cites must itself be one of the auth-relevant kinds for that event
    // (create, power_levels, target member, sender member — the same set
    // `expected_types` enumerates). A caller citing an unrelated type, e.g.
    // `m.room.topic`, as an "auth event" is just as malformed as omitting a
    // required one.
    for key in auth_events.keys() {
        if !expected_types.contains(key) {
            return Err(Error::AuthFailed { rule: "auth-events-extraneous" });
        }
    }

    // Rule 3: sender membership.
    let sender_membership = state
        .get(&(EventType::from(EventType::ROOM_MEMBER), event.sender().to_string()))
        .and_then(|e| membership_of(e.content()));
    let is_own_membership_transition =
        event.event_type().as_str() == EventType::ROOM_MEMBER && event.state_key() == Some(event.sender().as_str());
    if sender_membership != Some(MembershipState::Join) && !is_own_membership_transition {
        return Err(Error::AuthFailed { rule: "sender-not-joined" });
    }

    // Rule 4: membership transitions.
    if event.event_type().as_str() == EventType::ROOM_MEMBER {
        let Some(target) = event.state_key() else {
            return Err(Error::AuthFailed { rule: "membership-no-state-key" });
        };
        // A self-join against a non-public room with no standing invite is
        // its own auth rule (spec §4.2's join-rules check), called out
        // separately from the generic membership-transition table so
        // callers can tell "no invite" apart from e.g. a bad kick.
        if matches!(membership_of(event.content()), Some(MembershipState::Join))
            && event.sender().as_str() == target
        {
            let already_invited_or_joined = matches!(
                state
                    .get(&(EventType::from(EventType::ROOM_MEMBER), target.to_owned()))
                    .and_then(|e| membership_of(e.content())),
                Some(MembershipState::Invite) | Some(MembershipState::Join)
            );
            let join_rule_is_public = state
                .get(&(EventType::from(EventType::ROOM_JOIN_RULES), String::new()))
                .and_then(|e| e.content().get("join_rule"))
                .and_then(JsonValue::as_str)
                == Some("public");
            if !already_invited_or_joined && !join_rule_is_public {
                return Err(Error::AuthFailed { rule: "join-rules" });
            }
        }
        if !valid_membership_change(target, event.sender(), event.content(), state)? {
            return Err(Error::AuthFailed { rule: "invalid-membership-transition" });
        }
        return Ok(());
    }

    let levels = power_levels_from_state(state);
    let sender_level = effective_power_level(state, event.sender());

    // Rule 5: power-levels events.
    if event.event_type().as_str() == EventType::ROOM_POWER_LEVELS {
        if sender_level < levels.state_default {
            return Err(Error::AuthFailed { rule: "power-levels-insufficient-sender-power" });
        }
        let new_levels: PowerLevels =
            serde_json::from_value(event.content().clone()).map_err(concord_events::Error::from)?;
        for (user, &new_level) in &new_levels.users {
            let current_level = levels.user_level(user);
            if new_level > sender_level {
                return Err(Error::AuthFailed { rule: "power-levels-raise-above-self" });
            }
            if current_level >= sender_level && new_level < current_level && user != event.sender() {
                return Err(Error::AuthFailed { rule: "power-levels-lower-peer-or-better" });
            }
        }
        return Ok(());
    }

    // Rule 7: redactions.
    if event.event_type().as_str() == EventType::ROOM_REDACTION {
        let is_original_sender = redacted_event_sender.is_some_and(|s| s == event.sender());
        if sender_level < levels.redact && !is_original_sender {
            return Err(Error::AuthFailed { rule: "redact-insufficient-power" });
        }
        return Ok(());
    }

    // Rule 6: generic events.
    let required = levels.event_level(event.event_type().as_str(), event.is_state());
    if sender_level < required {
        return Err(Error::AuthFailed { rule: "insufficient-power" });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use concord_events::{EventHash, OriginServerTs, PduEvent};
    use concord_identifiers::{EventId, RoomId};
    use js_int::UInt;
    use serde_json::json;

    use super::*;

    fn event(
        sender: &str,
        event_type: &str,
        state_key: Option<&str>,
        content: JsonValue,
    ) -> Arc<dyn Event> {
        Arc::new(PduEvent {
            event_id: EventId::try_from(format!("${}", rand_suffix())).unwrap(),
            room_id: RoomId::try_from("!r:x").unwrap(),
            sender: UserId::try_from(sender).unwrap(),
            event_type: EventType::from(event_type),
            origin_server_ts: OriginServerTs(UInt::try_from(0u64).unwrap()),
            content,
            state_key: state_key.map(ToOwned::to_owned),
            prev_events: vec![],
            auth_events: vec![],
            depth: UInt::try_from(0u64).unwrap(),
            redacts: None,
            unsigned: BTreeMap::new(),
            hashes: EventHash::default(),
            signatures: BTreeMap::new(),
        })
    }

    fn rand_suffix() -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        COUNTER.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Narrows a full state snapshot down to just the `(type, state_key)`
    /// entries `auth_types_for_event` says are relevant to the given event —
    /// rule 2 rejects an `auth_events` map citing anything broader.
    fn scoped_auth_events(
        state: &StateMap<Arc<dyn Event>>,
        event_type: &str,
        sender: &str,
        state_key: Option<&str>,
        content: &JsonValue,
    ) -> StateMap<Arc<dyn Event>> {
        auth_types_for_event(
            &EventType::from(event_type),
            &UserId::try_from(sender).unwrap(),
            state_key,
            content,
        )
        .into_iter()
        .filter_map(|key| state.get(&key).map(|e| (key, Arc::clone(e))))
        .collect()
    }

    fn base_state() -> StateMap<Arc<dyn Event>> {
        let mut state = StateMap::new();
        state.insert(
            (EventType::from(EventType::ROOM_CREATE), "".into()),
            event("@alice:x", EventType::ROOM_CREATE, Some(""), json!({ "creator": "@alice:x" })),
        );
        state.insert(
            (EventType::from(EventType::ROOM_MEMBER), "@alice:x".into()),
            event("@alice:x", EventType::ROOM_MEMBER, Some("@alice:x"), json!({ "membership": "join" })),
        );
        state.insert(
            (EventType::from(EventType::ROOM_MEMBER), "@charlie:x".into()),
            event(
                "@alice:x",
                EventType::ROOM_MEMBER,
                Some("@charlie:x"),
                json!({ "membership": "join" }),
            ),
        );
        state.insert(
            (EventType::from(EventType::ROOM_POWER_LEVELS), "".into()),
            event(
                "@alice:x",
                EventType::ROOM_POWER_LEVELS,
                Some(""),
                json!({ "users": { "@alice:x": 100 } }),
            ),
        );
        state
    }

    #[test]
    fn ban_by_privileged_sender_passes() {
        let state = base_state();
        let ok = valid_membership_change(
            "@charlie:x",
            &UserId::try_from("@alice:x").unwrap(),
            &json!({ "membership": "ban" }),
            &state,
        )
        .unwrap();
        assert!(ok);
    }

    #[test]
    fn ban_by_unprivileged_sender_fails() {
        let state = base_state();
        let ok = valid_membership_change(
            "@alice:x",
            &UserId::try_from("@charlie:x").unwrap(),
            &json!({ "membership": "ban" }),
            &state,
        )
        .unwrap();
        assert!(!ok);
    }

    #[test]
    fn power_level_self_promotion_is_blocked() {
        let mut state = base_state();
        state.insert(
            (EventType::from(EventType::ROOM_POWER_LEVELS), "".into()),
            event(
                "@alice:x",
                EventType::ROOM_POWER_LEVELS,
                Some(""),
                json!({ "users": { "@alice:x": 50 } }),
            ),
        );
        let raise_content = json!({ "users": { "@alice:x": 100 } });
        let auth_events =
            scoped_auth_events(&state, EventType::ROOM_POWER_LEVELS, "@alice:x", Some(""), &raise_content);
        let raise = event("@alice:x", EventType::ROOM_POWER_LEVELS, Some(""), raise_content);
        let err = authorize(raise.as_ref(), &state, &auth_events, None).unwrap_err();
        assert!(matches!(err, Error::AuthFailed { rule: "power-levels-raise-above-self" }));
    }

    #[test]
    fn kick_requires_strictly_greater_power_level() {
        let mut state = base_state();
        state.insert(
            (EventType::from(EventType::ROOM_POWER_LEVELS), "".into()),
            event(
                "@alice:x",
                EventType::ROOM_POWER_LEVELS,
                Some(""),
                json!({ "users": { "@alice:x": 50, "@charlie:x": 50 } }),
            ),
        );
        let ok = valid_membership_change(
            "@charlie:x",
            &UserId::try_from("@alice:x").unwrap(),
            &json!({ "membership": "leave" }),
            &state,
        )
        .unwrap();
        assert!(!ok, "equal power levels must not allow a kick");

        state.insert(
            (EventType::from(EventType::ROOM_POWER_LEVELS), "".into()),
            event(
                "@alice:x",
                EventType::ROOM_POWER_LEVELS,
                Some(""),
                json!({ "users": { "@alice:x": 100, "@charlie:x": 50 } }),
            ),
        );
        let ok = valid_membership_change(
            "@charlie:x",
            &UserId::try_from("@alice:x").unwrap(),
            &json!({ "membership": "leave" }),
            &state,
        )
        .unwrap();
        assert!(ok, "strictly greater power level must allow a kick");
    }

    #[test]
    fn join_against_invite_only_room_without_invite_is_rejected() {
        let mut state = base_state();
        state.insert(
            (EventType::from(EventType::ROOM_JOIN_RULES), "".into()),
            event("@alice:x", EventType::ROOM_JOIN_RULES, Some(""), json!({ "join_rule": "invite" })),
        );
        let ok = valid_membership_change(
            "@bob:x",
            &UserId::try_from("@bob:x").unwrap(),
            &json!({ "membership": "join" }),
            &state,
        )
        .unwrap();
        assert!(!ok);
    }

    #[test]
    fn creator_can_author_first_power_levels_event_after_others_have_joined() {
        // base_state() already has alice and charlie joined and no power
        // levels event yet — the creator must still be able to author the
        // room's first m.room.power_levels event at this point.
        let mut state = base_state();
        state.remove(&(EventType::from(EventType::ROOM_POWER_LEVELS), "".into()));

        let bootstrap_content = json!({ "users": { "@alice:x": 100 } });
        let bootstrap = event("@alice:x", EventType::ROOM_POWER_LEVELS, Some(""), bootstrap_content.clone());
        let auth_events =
            scoped_auth_events(&state, EventType::ROOM_POWER_LEVELS, "@alice:x", Some(""), &bootstrap_content);
        assert!(authorize(bootstrap.as_ref(), &state, &auth_events, None).is_ok());
    }

    #[test]
    fn first_membership_event_does_not_require_a_prior_member_auth_event() {
        // Alice invites dave, who has no prior m.room.member event of his
        // own to cite — rule 2 must not demand one.
        let state = base_state();
        let invite_content = json!({ "membership": "invite" });
        let auth_events =
            scoped_auth_events(&state, EventType::ROOM_MEMBER, "@alice:x", Some("@dave:x"), &invite_content);
        let invite = event("@alice:x", EventType::ROOM_MEMBER, Some("@dave:x"), invite_content);
        assert!(authorize(invite.as_ref(), &state, &auth_events, None).is_ok());
    }
}
