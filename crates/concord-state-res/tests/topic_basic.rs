//! Two servers independently set the room topic after a common ancestor;
//! resolution must pick exactly one deterministically and the same way no
//! matter which order the two snapshots are passed in.

mod utils;

use std::sync::Arc;

use concord_events::EventType;
use concord_state_res::Event;
use serde_json::json;
use utils::*;

#[test]
fn later_depth_topic_wins_and_resolution_is_symmetric() {
    let (mut store, initial) = initial_room();
    let base_state = state_after(&store, &initial);

    let set_by_alice = pdu(
        "TOPIC_A",
        alice(),
        EventType::ROOM_TOPIC,
        Some(""),
        json!({ "topic": "alice's topic" }),
        auth_events_for(&store, &base_state, EventType::ROOM_TOPIC, &alice(), Some(""), &json!({})),
        vec![initial.last().unwrap().clone()],
    );
    store.insert(set_by_alice.event_id.clone(), Arc::clone(&set_by_alice) as Arc<dyn Event>);
    let mut state_a = base_state.clone();
    state_a.insert((EventType::from(EventType::ROOM_TOPIC), String::new()), set_by_alice.event_id.clone());

    let set_by_bob = pdu(
        "TOPIC_B",
        bob(),
        EventType::ROOM_TOPIC,
        Some(""),
        json!({ "topic": "bob's topic" }),
        auth_events_for(&store, &base_state, EventType::ROOM_TOPIC, &bob(), Some(""), &json!({})),
        vec![initial.last().unwrap().clone()],
    );
    store.insert(set_by_bob.event_id.clone(), Arc::clone(&set_by_bob) as Arc<dyn Event>);
    let mut state_b = base_state.clone();
    state_b.insert((EventType::from(EventType::ROOM_TOPIC), String::new()), set_by_bob.event_id.clone());

    let forward = resolve_two(&store, &state_a, &state_b);
    let backward = resolve_two(&store, &state_b, &state_a);

    assert_eq!(forward, backward, "state resolution must not depend on input order");
    assert!(
        forward.get(&(EventType::from(EventType::ROOM_TOPIC), String::new())).is_some(),
        "exactly one topic event must win"
    );
}
