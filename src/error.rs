//! Closed error taxonomy shared across module boundaries.
//!
//! Every public operation in this crate returns `Result<_, DesArcError>`.
//! Variants map directly onto the HTTP surface (see `http`) and dictate
//! retry policy in `retrieval::engine`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DesArcError {
    /// Malformed UID, `n_bits` out of range, `retain_until` in the past,
    /// illegal zone map. Surfaced to the caller unmodified.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// UID absent from the resolved shard, or shard object absent.
    /// Never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// Magic mismatch, truncated index, unknown codec id, or a
    /// post-decode size mismatch. Never retried.
    #[error("corrupt shard: {0}")]
    CorruptShard(String),

    /// Transport, timeout, 5xx, throttling. Retried once for idempotent
    /// GET/HEAD by the retrieval engine; write-path errors abort the
    /// shard without retry at this layer.
    #[error("backend error: {0}")]
    Backend(String),

    /// A single append would exceed the configured max shard size.
    #[error("shard too large: {0}")]
    ShardTooLarge(String),
}

impl From<std::io::Error> for DesArcError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => DesArcError::NotFound(e.to_string()),
            _ => DesArcError::Backend(e.to_string()),
        }
    }
}

impl From<object_store::Error> for DesArcError {
    fn from(e: object_store::Error) -> Self {
        match &e {
            object_store::Error::NotFound { .. } => DesArcError::NotFound(e.to_string()),
            _ => DesArcError::Backend(e.to_string()),
        }
    }
}
