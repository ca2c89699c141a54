use thiserror::Error;

/// Errors raised while parsing or constructing events.
///
/// This is a leaf error: `concord_core::Error::MalformedEvent` wraps it at
/// the state-manager boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("malformed event: {0}")]
    MalformedEvent(&'static str),

    #[error("invalid identifier: {0}")]
    InvalidId(#[from] concord_identifiers::IdParseError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
