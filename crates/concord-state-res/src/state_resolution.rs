//! The version-1 state-resolution algorithm from spec §4.4: given two or
//! more state snapshots at a common ancestry point, deterministically merge
//! them into one every honest server computes the same way.
//!
//! Grounded on the step functions `ruma-state-res/tests/event_sorting.rs`
//! exercises (`reverse_topological_power_sort`, `iterative_auth_check`,
//! `mainline_sort`) and the six-step algorithm text of spec §4.4, which is
//! authoritative where it's more specific than what the test fixtures imply
//! (step 5's ordering key is the event's own `depth`, not a full
//! mainline-index walk — see `mainline_sort`'s doc comment).

use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, BinaryHeap},
    sync::Arc,
};

use concord_events::{EventType, OriginServerTs};
use concord_identifiers::EventId;
use js_int::UInt;

use crate::{
    error::{Error, Result},
    event::Event,
    event_auth::{auth_types_for_event, is_power_event, AuthRules},
    state_map::{EventMap, StateMap},
};

/// Stable Kahn-style topological sort: `graph[node]` is the set of nodes
/// `node` depends on (must be emitted before it). Among nodes whose
/// dependencies are already satisfied, `key_fn` breaks ties — smallest `K`
/// first; its paired `EventId` is tracked alongside purely for bookkeeping
/// and never itself compared unless the caller folds it into `K`.
/// Dependencies that aren't themselves keys of `graph` are treated as
/// already satisfied (they're outside the set being sorted).
pub fn lexicographical_topological_sort<K: Ord + Clone>(
    graph: &BTreeMap<EventId, BTreeSet<EventId>>,
    key_fn: impl Fn(&EventId) -> (K, EventId),
) -> Vec<EventId> {
    let mut remaining: BTreeMap<EventId, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<EventId, Vec<EventId>> = BTreeMap::new();

    for (node, deps) in graph {
        let in_set_deps = deps.iter().filter(|d| graph.contains_key(*d)).count();
        remaining.insert(node.clone(), in_set_deps);
        for dep in deps.iter().filter(|d| graph.contains_key(*d)) {
            dependents.entry(dep.clone()).or_default().push(node.clone());
        }
    }

    let mut heap: BinaryHeap<Reverse<(K, EventId)>> = BinaryHeap::new();
    for (node, count) in &remaining {
        if *count == 0 {
            heap.push(Reverse(key_fn(node)));
        }
    }

    let mut sorted = Vec::with_capacity(graph.len());
    while let Some(Reverse((_, node))) = heap.pop() {
        if let Some(deps) = dependents.get(&node) {
            for dependent in deps.clone() {
                if let Some(count) = remaining.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        heap.push(Reverse(key_fn(&dependent)));
                    }
                }
            }
        }
        sorted.push(node);
    }

    sorted
}

/// The power level a sorting key should use for `event`: the level its
/// sender held in the power-levels event it cites among its own
/// `auth_events`, or `0` if it cites none (e.g. the create event itself).
fn power_level_for_sort<E: Event + ?Sized>(event: &E, event_map: &EventMap<Arc<dyn Event>>) -> i64 {
    for auth_id in event.auth_events() {
        if let Some(auth_event) = event_map.get(auth_id) {
            if auth_event.event_type().as_str() == EventType::ROOM_POWER_LEVELS {
                if let Ok(levels) =
                    serde_json::from_value::<crate::power_levels::PowerLevels>(auth_event.content().clone())
                {
                    return levels.user_level(event.sender());
                }
            }
        }
    }
    0
}

/// Spec §4.4 step 4: reverse topological sort of the power events by
/// `(power_level_at_origin DESC, origin_ts ASC, event_id ASC)`.
///
/// The event-id component is applied in reverse within the tie-break
/// itself (`Reverse<EventId>`), not to the final winner: ties only ever
/// arise between nodes with no dependency edge between them (an edge would
/// make one un-ready until the other is processed, so they couldn't tie in
/// the first place), and `iterative_auth_check` keeps whichever
/// successfully-authorized candidate for a key is applied *last*. Pairing
/// "last-applied-for-a-key wins" with an ascending id tie-break would hand
/// the win to the lexicographically *larger* sibling id; spec §8 scenario 5
/// requires the smaller one. Reversing the tie-break (larger id processed,
/// and so applied, first) is what makes the smaller id the one left
/// standing, without disturbing true supersession chains, which are
/// ordered by the dependency edge, never by this tie-break.
pub fn reverse_topological_power_sort(
    power_events: &[EventId],
    event_map: &EventMap<Arc<dyn Event>>,
) -> Vec<EventId> {
    let power_set: BTreeSet<EventId> = power_events.iter().cloned().collect();

    let mut graph: BTreeMap<EventId, BTreeSet<EventId>> = BTreeMap::new();
    for id in power_events {
        let deps = event_map
            .get(id)
            .map(|e| e.auth_events().iter().filter(|a| power_set.contains(*a)).cloned().collect())
            .unwrap_or_default();
        graph.insert(id.clone(), deps);
    }

    lexicographical_topological_sort(&graph, |id| {
        let power = event_map.get(id).map_or(0, |e| power_level_for_sort(e.as_ref(), event_map));
        let ts = event_map
            .get(id)
            .map_or(OriginServerTs(UInt::try_from(0u64).unwrap()), |e| e.origin_server_ts());
        ((-power, ts, Reverse(id.clone())), id.clone())
    })
}

fn state_key_pair(event: &dyn Event) -> Option<(EventType, String)> {
    event.state_key().map(|key| (event.event_type().clone(), key.to_owned()))
}

/// Applies `sorted_events` one by one to a working snapshot seeded from
/// `base_state`, re-authorizing each against that working snapshot (spec
/// §4.4 steps 4 and 5: "re-authorizing each against the working snapshot's
/// auth view. Events that fail re-auth are dropped.").
pub fn iterative_auth_check(
    rules: &dyn AuthRules,
    sorted_events: &[EventId],
    base_state: &StateMap<EventId>,
    event_map: &EventMap<Arc<dyn Event>>,
) -> Result<StateMap<EventId>> {
    let mut resolved_ids: StateMap<EventId> = base_state.clone();
    let mut resolved_events: StateMap<Arc<dyn Event>> = resolved_ids
        .iter()
        .filter_map(|(key, id)| event_map.get(id).map(|e| (key.clone(), Arc::clone(e))))
        .collect();

    for event_id in sorted_events {
        let Some(event) = event_map.get(event_id) else {
            tracing::debug!(%event_id, "iterative_auth_check: event not in event_map, skipping");
            continue;
        };
        let Some(key) = state_key_pair(event.as_ref()) else {
            continue;
        };

        let auth_types =
            auth_types_for_event(event.event_type(), event.sender(), event.state_key(), event.content());
        let auth_view: StateMap<Arc<dyn Event>> = auth_types
            .into_iter()
            .filter_map(|k| resolved_events.get(&k).map(|e| (k, Arc::clone(e))))
            .collect();

        match rules.authorize(event.as_ref(), &resolved_events, &auth_view, None) {
            Ok(()) => {
                resolved_ids.insert(key.clone(), event_id.clone());
                resolved_events.insert(key, Arc::clone(event));
            }
            Err(_) => {
                tracing::debug!(%event_id, "iterative_auth_check: event failed re-authorization, dropping");
            }
        }
    }

    Ok(resolved_ids)
}

/// Spec §4.4 step 5: orders the remaining non-power conflicted events by
/// `(depth ASC, event_id ASC)`. The `anchor` parameter is accepted for
/// shape-compatibility with implementations that key mainline position off
/// a specific power-levels event, but this implementation follows the
/// spec's literal, simpler ordering key instead.
pub fn mainline_sort(
    events_to_sort: &[EventId],
    _anchor: Option<&EventId>,
    event_map: &EventMap<Arc<dyn Event>>,
) -> Vec<EventId> {
    let mut sorted = events_to_sort.to_vec();
    sorted.sort_by_key(|id| {
        let depth = event_map.get(id).map_or(UInt::try_from(0u64).unwrap(), |e| e.depth());
        (depth, id.clone())
    });
    sorted
}

/// The entry point: spec §4.4's full algorithm. `auth_chains` supplies, per
/// input state set, the auth chain of that set's events — the caller
/// (typically the state manager, backed by `auth_chain::auth_chain` and a
/// storage repository) computes this, since only it knows how to resolve
/// ids to events outside what's already in `event_map`.
pub fn resolve(
    rules: &dyn AuthRules,
    state_sets: &[StateMap<EventId>],
    auth_chains: &[BTreeSet<EventId>],
    event_map: &EventMap<Arc<dyn Event>>,
) -> Result<StateMap<EventId>> {
    if state_sets.is_empty() {
        return Err(Error::StateResolution("resolve called with no input state sets"));
    }
    // P2 — resolution idempotence: resolve([S]) = S.
    if state_sets.len() == 1 {
        return Ok(state_sets[0].clone());
    }

    let mut all_keys: BTreeSet<(EventType, String)> = BTreeSet::new();
    for set in state_sets {
        all_keys.extend(set.keys().cloned());
    }

    let mut unconflicted = StateMap::new();
    let mut conflicted_events: BTreeSet<EventId> = BTreeSet::new();

    for key in all_keys {
        let values: Vec<Option<&EventId>> = state_sets.iter().map(|s| s.get(&key)).collect();
        let first = values[0];
        if values.iter().all(|v| *v == first) {
            if let Some(id) = first {
                unconflicted.insert(key, id.clone());
            }
        } else {
            for id in values.into_iter().flatten() {
                conflicted_events.insert(id.clone());
            }
        }
    }

    let auth_difference: BTreeSet<EventId> = if auth_chains.len() > 1 {
        let union: BTreeSet<EventId> = auth_chains.iter().flatten().cloned().collect();
        let common = auth_chains
            .iter()
            .cloned()
            .reduce(|a, b| a.intersection(&b).cloned().collect())
            .unwrap_or_default();
        union.difference(&common).cloned().collect()
    } else {
        BTreeSet::new()
    };

    let full_conflict_set: BTreeSet<EventId> =
        conflicted_events.union(&auth_difference).cloned().collect();

    let power_events: Vec<EventId> = full_conflict_set
        .iter()
        .filter(|id| event_map.get(*id).is_some_and(|e| is_power_event(e.as_ref())))
        .cloned()
        .collect();

    let sorted_power = reverse_topological_power_sort(&power_events, event_map);
    let resolved_power_ids = iterative_auth_check(rules, &sorted_power, &unconflicted, event_map)?;

    let power_set: BTreeSet<EventId> = power_events.into_iter().collect();
    let remaining: Vec<EventId> =
        full_conflict_set.into_iter().filter(|id| !power_set.contains(id)).collect();

    let resolved_power_event_id = resolved_power_ids
        .get(&(EventType::from(EventType::ROOM_POWER_LEVELS), String::new()))
        .cloned();
    let sorted_remaining = mainline_sort(&remaining, resolved_power_event_id.as_ref(), event_map);

    iterative_auth_check(rules, &sorted_remaining, &resolved_power_ids, event_map)
}
