use concord_identifiers::EventId;
use thiserror::Error;

/// Errors raised by the authorization engine, auth chains, and state
/// resolution. `concord_core::Error` wraps the variants that escape to the
/// state manager's callers (`AuthFailed`, `StateResolutionError`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("event not found: {0}")]
    NotFound(String),

    #[error("authorization denied by rule {rule}")]
    AuthFailed { rule: &'static str },

    #[error("cycle detected in auth DAG at {0}")]
    InvalidAuthDag(EventId),

    #[error("state resolution precondition violated: {0}")]
    StateResolution(&'static str),

    #[error("malformed event: {0}")]
    Event(#[from] concord_events::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
