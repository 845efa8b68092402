use thiserror::Error;

/// Everything that can go wrong talking to upstream. The watcher treats every
/// variant like an empty result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Upstream returned HTTP {0}")]
    Status(u16),
    #[error("Response decode error: {0}")]
    Decode(String),
    #[error("Unexpected data shape: {0}")]
    UnexpectedShape(String),
}
