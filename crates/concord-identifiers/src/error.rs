use thiserror::Error;

/// Failure to parse an opaque sigil-prefixed identifier.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum IdParseError {
    #[error("identifier is empty")]
    Empty,

    #[error("{what} must start with '{expected}'")]
    MissingSigil { expected: char, what: &'static str },

    #[error("{what} has no localpart after its sigil")]
    MissingLocalpart { what: &'static str },

    #[error("{what} contains whitespace or control characters")]
    InvalidCharacters { what: &'static str },
}
