#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicU64, Ordering::SeqCst},
        Arc,
    },
};

use concord_events::{EventHash, EventType, OriginServerTs, PduEvent};
use concord_identifiers::{EventId, RoomId, UserId};
use concord_state_res::{
    auth_chain, auth_types_for_event, resolve, AuthRules, AuthRulesV1, Event, EventMap, StateMap,
};
use js_int::UInt;
use serde_json::{json, Value as JsonValue};

static TS: AtomicU64 = AtomicU64::new(1);

pub fn room_id() -> RoomId {
    RoomId::try_from("!test:foo").unwrap()
}

pub fn user(name: &str) -> UserId {
    UserId::try_from(format!("@{name}:foo")).unwrap()
}

pub fn alice() -> UserId {
    user("alice")
}
pub fn bob() -> UserId {
    user("bob")
}
pub fn charlie() -> UserId {
    user("charlie")
}

pub fn event_id(label: &str) -> EventId {
    EventId::try_from(format!("${label}:foo")).unwrap()
}

/// Builds a fully-formed `PduEvent` fixture. `auth_events`/`prev_events` are
/// taken as already-resolved ids (callers compute them from the running
/// state, same as `to_pdu_event` in the teacher's own test harness).
pub fn pdu(
    label: &str,
    sender: UserId,
    event_type: &str,
    state_key: Option<&str>,
    content: JsonValue,
    auth_events: Vec<EventId>,
    prev_events: Vec<EventId>,
) -> Arc<PduEvent> {
    let depth = UInt::try_from(TS.fetch_add(1, SeqCst)).unwrap();
    Arc::new(PduEvent {
        event_id: event_id(label),
        room_id: room_id(),
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
    })
}

pub fn member_content(membership: &str) -> JsonValue {
    json!({ "membership": membership })
}

/// A minimal room: create, alice joins, alice takes power 100, public join
/// rules, bob and charlie join. Mirrors the teacher's `INITIAL_EVENTS`
/// fixture, trimmed to what the scenario tests actually exercise.
pub fn initial_room() -> (EventMap<Arc<dyn Event>>, Vec<EventId>) {
    let mut store: EventMap<Arc<dyn Event>> = EventMap::new();
    let mut insert = |ev: Arc<PduEvent>| {
        let id = ev.event_id.clone();
        store.insert(id.clone(), ev as Arc<dyn Event>);
        id
    };

    let create = insert(pdu(
        "CREATE",
        alice(),
        EventType::ROOM_CREATE,
        Some(""),
        json!({ "creator": alice().to_string() }),
        vec![],
        vec![],
    ));
    let ima = insert(pdu(
        "IMA",
        alice(),
        EventType::ROOM_MEMBER,
        Some(alice().as_str()),
        member_content("join"),
        vec![create.clone()],
        vec![create.clone()],
    ));
    let ipower = insert(pdu(
        "IPOWER",
        alice(),
        EventType::ROOM_POWER_LEVELS,
        Some(""),
        json!({ "users": { alice().to_string(): 100 } }),
        vec![create.clone(), ima.clone()],
        vec![ima.clone()],
    ));
    let ijr = insert(pdu(
        "IJR",
        alice(),
        EventType::ROOM_JOIN_RULES,
        Some(""),
        json!({ "join_rule": "public" }),
        vec![create.clone(), ima.clone(), ipower.clone()],
        vec![ipower.clone()],
    ));
    let imb = insert(pdu(
        "IMB",
        bob(),
        EventType::ROOM_MEMBER,
        Some(bob().as_str()),
        member_content("join"),
        vec![create.clone(), ijr.clone(), ipower.clone()],
        vec![ijr.clone()],
    ));
    let imc = insert(pdu(
        "IMC",
        charlie(),
        EventType::ROOM_MEMBER,
        Some(charlie().as_str()),
        member_content("join"),
        vec![create.clone(), ijr.clone(), ipower.clone()],
        vec![imb.clone()],
    ));

    (store, vec![create, ima, ipower, ijr, imb, imc])
}

/// Reconstructs the `(event_type, state_key) -> event_id` snapshot after
/// applying `ids` in order — every one of them is a state event in these
/// fixtures.
pub fn state_after(store: &EventMap<Arc<dyn Event>>, ids: &[EventId]) -> StateMap<EventId> {
    let mut state = StateMap::new();
    for id in ids {
        let ev = store.get(id).unwrap();
        if let Some(key) = ev.state_key() {
            state.insert((ev.event_type().clone(), key.to_string()), id.clone());
        }
    }
    state
}

pub fn auth_events_for(
    store: &EventMap<Arc<dyn Event>>,
    state: &StateMap<EventId>,
    event_type: &str,
    sender: &UserId,
    state_key: Option<&str>,
    content: &JsonValue,
) -> Vec<EventId> {
    let types = auth_types_for_event(&EventType::from(event_type), sender, state_key, content);
    types
        .into_iter()
        .filter_map(|key| state.get(&key).cloned())
        .filter(|id| store.contains_key(id))
        .collect()
}

pub fn rules() -> &'static dyn AuthRules {
    &AuthRulesV1
}

/// Resolves two state snapshots built over the same `store`, following the
/// same auth-chain-per-snapshot wiring `concord-core::StateManager::resolve`
/// does against a real `StorageRepository`.
pub fn resolve_two(
    store: &EventMap<Arc<dyn Event>>,
    a: &StateMap<EventId>,
    b: &StateMap<EventId>,
) -> StateMap<EventId> {
    let state_sets = vec![a.clone(), b.clone()];
    let auth_chains: Vec<BTreeSet<EventId>> = state_sets
        .iter()
        .map(|set| {
            let starting: Vec<EventId> = set.values().cloned().collect();
            auth_chain(&starting, |id| store.get(id).cloned()).unwrap()
        })
        .collect();

    resolve(rules(), &state_sets, &auth_chains, store).unwrap()
}
