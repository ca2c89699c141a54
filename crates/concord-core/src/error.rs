use thiserror::Error;

/// The state manager's error surface, per spec §7. `StorageError` is always
/// surfaced; `AuthFailed`/`SoftFailed` are ordinarily folded into
/// [`crate::manager::Acceptance`] by `submit_event` rather than raised here —
/// these variants exist for callers reached through other entry points
/// (`get_state`, `resolve`) where there's no acceptance three-way to report
/// through instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("unknown room: {0}")]
    UnknownRoom(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("authorization denied by rule {rule}")]
    AuthFailed { rule: &'static str },

    #[error("soft-failed by rule {rule}")]
    SoftFailed { rule: &'static str },

    #[error("state resolution precondition violated: {0}")]
    StateResolutionError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<concord_events::Error> for Error {
    fn from(err: concord_events::Error) -> Self {
        Self::MalformedEvent(err.to_string())
    }
}

impl From<concord_state_res::Error> for Error {
    fn from(err: concord_state_res::Error) -> Self {
        use concord_state_res::Error as E;
        match err {
            E::NotFound(id) => Self::UnknownEvent(id),
            E::AuthFailed { rule } => Self::AuthFailed { rule },
            E::InvalidAuthDag(id) => Self::StateResolutionError(format!("cycle in auth DAG at {id}")),
            E::StateResolution(reason) => Self::StateResolutionError(reason.to_owned()),
            E::Event(inner) => Self::from(inner),
        }
    }
}
