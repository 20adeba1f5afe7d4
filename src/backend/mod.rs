//! Storage back-end abstraction (`spec.md` §4.5, §7).
//!
//! One trait, two implementations: `local` (filesystem, dev/test) and
//! `object_store_backend` (S3-compatible, production). Every other module
//! talks to storage only through `Backend` — nothing upstream knows which
//! one it got. Modeled on the `object_store`-based snapshot reader pattern
//! seen in the pack (`other_examples/..._sui__crates-sui-snapshot-src-reader.rs.rs`):
//! a thin async trait over byte ranges, no domain knowledge.

pub mod local;
pub mod object_store_backend;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::DesArcError;

/// An inclusive-exclusive byte range `[start, end)` for a ranged GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectMeta {
    pub size: u64,
}

/// Object-lock semantics a backend can offer for extended retention.
/// Neither backend currently returns `Supported`: hard enforcement would
/// require either filesystem-level immutability or a real S3 Object Lock
/// API call, and both instead record the deadline in a sidecar record that
/// `retention::RetentionManager` reads back to enforce monotonicity — see
/// `backend::local` and `backend::object_store_backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionSupport {
    Supported,
    SoftOnly,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), DesArcError>;

    async fn get(&self, key: &str) -> Result<Bytes, DesArcError>;

    async fn get_range(&self, key: &str, range: ByteRange) -> Result<Bytes, DesArcError>;

    async fn head(&self, key: &str) -> Result<ObjectMeta, DesArcError>;

    async fn exists(&self, key: &str) -> Result<bool, DesArcError> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(DesArcError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), DesArcError>;

    /// Apply (or simulate) a retention lock on `key` until `retain_until`
    /// (unix seconds). Backends without native object lock support must
    /// still honor the call via `retention::RetentionManager`'s overlay.
    async fn object_lock_set(&self, key: &str, retain_until: i64) -> Result<(), DesArcError>;

    /// Read back the `retain_until` most recently set via `object_lock_set`,
    /// if any. `retention::RetentionManager` uses this to enforce that
    /// retention only ever extends, never shortens.
    async fn object_lock_get(&self, key: &str) -> Result<Option<i64>, DesArcError>;

    fn retention_support(&self) -> RetentionSupport;
}
