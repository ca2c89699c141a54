//! Room state modeling, the authorization engine, and the v1 state
//! resolution algorithm (spec §4). Pure and storage-agnostic: every
//! function here takes its inputs by value or reference and returns a
//! result — nothing in this crate reads or writes durable storage. That's
//! `concord-core`'s job, built on top of what's exported here.

pub mod auth_chain;
pub mod error;
pub mod event;
pub mod event_auth;
pub mod power_levels;
pub mod room_version;
pub mod state_map;
pub mod state_resolution;

pub use auth_chain::auth_chain;
pub use error::{Error, Result};
pub use event::Event;
pub use event_auth::{
    auth_types_for_event, authorize, effective_power_level, is_power_event, membership_of,
    valid_membership_change, AuthRules, AuthRulesV1, MembershipState,
};
pub use power_levels::PowerLevels;
pub use room_version::RoomVersion;
pub use state_map::{EventMap, StateMap};
pub use state_resolution::{
    iterative_auth_check, lexicographical_topological_sort, mainline_sort, reverse_topological_power_sort,
    resolve,
};
