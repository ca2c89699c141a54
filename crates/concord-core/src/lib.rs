//! The state manager, storage seam, and cache that make up the mediator
//! layer of spec §4.6/§4.7/§5/§6: the piece that turns the pure functions in
//! `concord-state-res` into a stateful, concurrency-safe service over a
//! caller-supplied [`StorageRepository`].

pub mod cache;
pub mod config;
pub mod error;
pub mod manager;
pub mod room_state;
pub mod storage;

pub use cache::{CacheStats, RoomSummary};
pub use config::{CacheConfig, StateManagerConfig};
pub use error::{Error, Result};
pub use manager::{
    Acceptance, At, ChangeEvent, FederationIngest, Origin, StateManager, Subscription, Subscriptions,
};
pub use room_state::{RoomState, StateDiff};
pub use storage::{Direction, EventPage, StorageRepository};
