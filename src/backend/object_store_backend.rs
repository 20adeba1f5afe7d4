//! S3-compatible backend over the `object_store` crate.
//!
//! Grounded on the snapshot reader pattern in
//! `other_examples/..._sui__crates-sui-snapshot-src-reader.rs.rs`: hold an
//! `Arc<dyn ObjectStore>`, translate domain keys to `object_store::path::Path`,
//! and let the crate's own retry/backoff live underneath — this module adds
//! nothing on top except the `Backend` trait and error mapping. Retention is
//! soft here too: `object_store` has no retention API of its own, so this
//! backend records the requested deadline in a sidecar object rather than
//! claiming an enforcement guarantee it cannot back up.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{GetOptions, GetRange, ObjectStore};
use std::sync::Arc;

use super::{Backend, ByteRange, ObjectMeta, RetentionSupport};
use crate::error::DesArcError;

pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn path(key: &str) -> Result<ObjectPath, DesArcError> {
        ObjectPath::parse(key).map_err(|e| DesArcError::InvalidInput(format!("bad object key {key}: {e}")))
    }
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), DesArcError> {
        let path = Self::path(key)?;
        self.store.put(&path, data.into()).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, DesArcError> {
        let path = Self::path(key)?;
        let result = self.store.get(&path).await?;
        Ok(result.bytes().await?)
    }

    async fn get_range(&self, key: &str, range: ByteRange) -> Result<Bytes, DesArcError> {
        let path = Self::path(key)?;
        let opts = GetOptions {
            range: Some(GetRange::Bounded(range.start..range.end)),
            ..Default::default()
        };
        let result = self.store.get_opts(&path, opts).await?;
        Ok(result.bytes().await?)
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, DesArcError> {
        let path = Self::path(key)?;
        let meta = self.store.head(&path).await?;
        Ok(ObjectMeta { size: meta.size as u64 })
    }

    async fn delete(&self, key: &str) -> Result<(), DesArcError> {
        let path = Self::path(key)?;
        self.store.delete(&path).await?;
        Ok(())
    }

    /// `object_store` exposes no first-class object-lock/retention API, so
    /// enforcement at the bucket level (S3 Object Lock, configured out of
    /// band) is the only hard guarantee this backend can offer. What this
    /// call *can* do honestly is persist the requested `retain_until`
    /// somewhere queryable, as a `<key>.retain` sibling object, so
    /// `retention::RetentionManager` can read it back and enforce the
    /// monotonicity invariant even though this backend cannot itself deny
    /// an early delete.
    async fn object_lock_set(&self, key: &str, retain_until: i64) -> Result<(), DesArcError> {
        self.exists(key).await?.then_some(()).ok_or_else(|| {
            DesArcError::NotFound(format!("cannot set retention on missing object {key}"))
        })?;
        let sidecar = Self::path(&format!("{key}.retain"))?;
        self.store.put(&sidecar, retain_until.to_string().into_bytes().into()).await?;
        Ok(())
    }

    async fn object_lock_get(&self, key: &str) -> Result<Option<i64>, DesArcError> {
        let sidecar = Self::path(&format!("{key}.retain"))?;
        match self.store.get(&sidecar).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                let s = std::str::from_utf8(&bytes)
                    .map_err(|_| DesArcError::CorruptShard(format!("malformed retain sidecar for {key}")))?;
                let value = s.trim().parse().map_err(|_| {
                    DesArcError::CorruptShard(format!("malformed retain sidecar for {key}"))
                })?;
                Ok(Some(value))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Downgraded from `Supported`: this backend cannot itself deny an
    /// early delete/overwrite, only the bucket's out-of-band Object Lock
    /// configuration can. Retention here is enforced the same way as
    /// `local` — via the sidecar record plus `retention::RetentionManager`.
    fn retention_support(&self) -> RetentionSupport {
        RetentionSupport::SoftOnly
    }
}
