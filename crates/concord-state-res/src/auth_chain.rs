//! `auth_chain(events)`: the transitive closure of `auth_events`, required
//! to be a DAG (spec §4.5). Grounded on `TestStore::auth_event_ids`'s DFS
//! shape in `ruma-state-res/tests/utils.rs`.

use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use concord_identifiers::EventId;

use crate::{
    error::{Error, Result},
    event::Event,
};

/// Resolves the transitive `auth_events` closure of `starting_points`.
/// `lookup` fetches an event by id (typically backed by a store or the
/// in-memory event map state resolution already built up); a cycle is
/// detected via a per-path visited set and surfaces as `InvalidAuthDag`.
pub fn auth_chain<E, F>(starting_points: &[EventId], mut lookup: F) -> Result<BTreeSet<EventId>>
where
    E: Event + ?Sized,
    F: FnMut(&EventId) -> Option<Arc<E>>,
{
    let mut result = BTreeSet::new();
    let mut path = HashSet::new();

    for start in starting_points {
        visit(start, &mut lookup, &mut result, &mut path)?;
    }

    Ok(result)
}

fn visit<E, F>(
    id: &EventId,
    lookup: &mut F,
    result: &mut BTreeSet<EventId>,
    path: &mut HashSet<EventId>,
) -> Result<()>
where
    E: Event + ?Sized,
    F: FnMut(&EventId) -> Option<Arc<E>>,
{
    if result.contains(id) {
        return Ok(());
    }
    if !path.insert(id.clone()) {
        return Err(Error::InvalidAuthDag(id.clone()));
    }

    let event = lookup(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
    for auth_id in event.auth_events() {
        visit(auth_id, lookup, result, path)?;
    }

    path.remove(id);
    result.insert(id.clone());
    Ok(())
}
