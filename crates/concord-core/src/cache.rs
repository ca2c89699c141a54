//! The bounded, TTL-aware, LRU-evicting state cache (spec §4.6). Grounded on
//! `include/matrix/core/state/state_cache.hpp`'s `CacheConfig`/
//! `get_cache_stats`/`touch_room_state` shape; the `lru-cache` crate is the
//! teacher workspace's own choice for this concern (`palpo`'s
//! `crates/{server,data}/Cargo.toml` both depend on it for exactly this kind
//! of bounded memoization).

use std::{sync::Mutex, time::Instant};

use concord_identifiers::{RoomId, UserId};
use concord_state_res::PowerLevels;
use lru_cache::LruCache;

use crate::config::CacheConfig;
use crate::room_state::RoomState;

/// A derived, cached view of a room's current meaning — spec §2's supplement
/// filling in the fields spec.md's body names but never lists
/// (`original_source`'s `get_room_summary`).
#[derive(Clone, Debug, Default)]
pub struct RoomSummary {
    pub room_id: Option<RoomId>,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub avatar_url: Option<String>,
    pub joined_member_count: usize,
    pub creator: Option<UserId>,
    pub is_encrypted: bool,
    pub join_rule: Option<String>,
}

/// A point-in-time snapshot of cache effectiveness
/// (`original_source`'s `get_cache_stats`/`get_total_cached_items`).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    pub rooms_cached: usize,
    pub events_cached: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Clone)]
pub(crate) struct CacheEntry {
    pub snapshot: RoomState,
    pub power_levels: PowerLevels,
    pub summary: RoomSummary,
    inserted_at: Instant,
}

struct Inner {
    rooms: LruCache<RoomId, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Sharded only at the granularity of one lock guarding the whole LRU list
/// (spec §5: "the LRU list is protected by its own mutex and must not be
/// held across user-supplied callbacks") — every critical section here is a
/// plain map operation, never an await point.
pub struct StateCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
}

impl StateCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                rooms: LruCache::new(config.max_rooms.max(1)),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.inserted_at.elapsed().as_secs() < self.config.default_ttl_seconds
    }

    /// Touch-on-read (spec §4.6: "Touches happen on read"); entries past TTL
    /// are treated as misses, per the same section, even though the LRU list
    /// itself doesn't reclaim them until the next insert pushes it over
    /// capacity or [`Self::sweep_expired`] runs.
    pub fn get(&self, room: &RoomId) -> Option<CacheEntry> {
        let mut inner = self.inner.lock().expect("state cache lock poisoned");
        match inner.rooms.get_mut(room) {
            Some(entry) if self.is_fresh(entry) => {
                let entry = entry.clone();
                inner.hits += 1;
                Some(entry)
            }
            Some(_) => {
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, room: RoomId, snapshot: RoomState, power_levels: PowerLevels, summary: RoomSummary) {
        let mut inner = self.inner.lock().expect("state cache lock poisoned");
        let at_capacity = inner.rooms.len() >= inner.rooms.capacity() && !inner.rooms.contains_key(&room);
        if at_capacity {
            inner.evictions += 1;
        }
        inner.rooms.insert(
            room,
            CacheEntry { snapshot, power_levels, summary, inserted_at: Instant::now() },
        );
    }

    /// Invalidates a room's entry. Called before `submit_event` returns for
    /// any accepted state-changing event (spec §4.6's coherence contract).
    pub fn invalidate(&self, room: &RoomId) {
        let mut inner = self.inner.lock().expect("state cache lock poisoned");
        inner.rooms.remove(room);
    }

    /// Proactively reclaims TTL-expired entries. Not run automatically —
    /// the embedding application's own task scheduler drives this (the
    /// library owns no background tasks; see spec §6, "no CLI... are core
    /// concerns").
    pub fn sweep_expired(&self) {
        let mut inner = self.inner.lock().expect("state cache lock poisoned");
        let ttl = self.config.default_ttl_seconds;
        let expired: Vec<RoomId> = inner
            .rooms
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed().as_secs() >= ttl)
            .map(|(room, _)| room.clone())
            .collect();
        for room in expired {
            inner.rooms.remove(&room);
            inner.evictions += 1;
        }
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("state cache lock poisoned");
        let events_cached = inner.rooms.iter().map(|(_, entry)| entry.snapshot.entries().len()).sum();
        CacheStats {
            rooms_cached: inner.rooms.len(),
            events_cached,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}
