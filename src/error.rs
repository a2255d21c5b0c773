//! Error types for streaming responses

use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by streaming and response construction.
///
/// Malformed or unsatisfiable `Range` headers are not errors: they resolve to
/// a full response or a `416` through [`RangeDecision`](crate::RangeDecision).
#[derive(Error, Debug)]
pub enum Error {
    /// Seeking or reading the body failed, or writing to the sink failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The body of a [`StreamResponse`](crate::StreamResponse) is always
    /// derived from its stream and cannot be replaced.
    #[error("content cannot be set on a stream response")]
    ContentNotSettable,

    #[error("Configuration error: {0}")]
    Config(String),
}
