//! The event model: canonical JSON, content-addressed event ids, typed
//! content access, and redaction.
//!
//! Grounded on `ruma_events`' `Pdu` shape (a common header plus an opaque,
//! lazily-typed `content`) and `ruma_common`'s canonical JSON machinery,
//! simplified to a single event shape since this workspace targets room
//! version "1"-style semantics (spec §1) rather than every historical PDU
//! format.

pub mod canonical_json;
pub mod error;
pub mod event_type;
pub mod pdu;
pub mod redaction;

pub use canonical_json::{CanonicalJsonObject, CanonicalJsonValue};
pub use error::Error;
pub use event_type::EventType;
pub use pdu::{compute_event_id, EventHash, OriginServerTs, PduEvent};

pub type Result<T> = std::result::Result<T, Error>;
