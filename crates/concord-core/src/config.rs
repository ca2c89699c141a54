use concord_state_res::RoomVersion;

/// Bounds for [`crate::cache::StateCache`], per spec §4.6. Mirrors
/// `original_source`'s `StateCache::CacheConfig`.
#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub max_rooms: usize,
    pub max_events_per_room: usize,
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_rooms: 10_000, max_events_per_room: 100_000, default_ttl_seconds: 300 }
    }
}

/// Construction-time configuration for [`crate::manager::StateManager`].
/// No env var or file parsing lives here (spec §6: "No CLI, no environment
/// variables") — this is a plain library API.
#[derive(Clone, Copy, Debug)]
pub struct StateManagerConfig {
    pub cache: CacheConfig,
    pub room_version: RoomVersion,
    /// Bound on `UnknownEvent` backfill recovery (spec §7): beyond this many
    /// hops of `resolve_missing`, a dangling reference soft-fails instead of
    /// blocking indefinitely on federation backfill.
    pub max_backfill_depth: u32,
    /// Subscribers more than this many events behind are dropped (spec §5's
    /// "backpressure by dropping subscribers that fall more than N events
    /// behind"); implemented as the broadcast channel's capacity.
    pub subscription_buffer: usize,
}

impl Default for StateManagerConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            room_version: RoomVersion::default(),
            max_backfill_depth: 20,
            subscription_buffer: 256,
        }
    }
}
