//! Local filesystem backend. Development and test default; also the
//! backend used by the single-node deployment in `spec.md` §7.
//!
//! Writes go to a `.tmp` sibling then `rename` into place, matching the
//! "stage then atomically publish" discipline the teacher uses when
//! patching the superblock in `sixcy::io_stream::SixCyWriter::finalize`.
//! No object lock primitive exists on a plain filesystem, so retention is
//! always soft: a sidecar `<key>.retain` file records the deadline and
//! `retention::RetentionManager` is the only thing that enforces it.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::{Backend, ByteRange, ObjectMeta, RetentionSupport};
use crate::error::DesArcError;

pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn retain_sidecar(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.retain"))
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), DesArcError> {
        let dest = self.resolve(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = dest.with_extension("tmp");
        {
            let mut f = tokio::fs::File::create(&tmp).await?;
            f.write_all(&data).await?;
            f.flush().await?;
        }
        tokio::fs::rename(&tmp, &dest).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, DesArcError> {
        let data = tokio::fs::read(self.resolve(key)).await?;
        Ok(Bytes::from(data))
    }

    async fn get_range(&self, key: &str, range: ByteRange) -> Result<Bytes, DesArcError> {
        let mut f = tokio::fs::File::open(self.resolve(key)).await?;
        f.seek(std::io::SeekFrom::Start(range.start)).await?;
        let mut buf = vec![0u8; range.len() as usize];
        f.read_exact(&mut buf).await.map_err(|e| {
            DesArcError::CorruptShard(format!("short read on range {:?}: {e}", range))
        })?;
        Ok(Bytes::from(buf))
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, DesArcError> {
        let meta = tokio::fs::metadata(self.resolve(key)).await?;
        Ok(ObjectMeta { size: meta.len() })
    }

    async fn delete(&self, key: &str) -> Result<(), DesArcError> {
        tokio::fs::remove_file(self.resolve(key)).await?;
        Ok(())
    }

    async fn object_lock_set(&self, key: &str, retain_until: i64) -> Result<(), DesArcError> {
        let sidecar = self.retain_sidecar(key);
        if let Some(parent) = sidecar.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(sidecar, retain_until.to_string()).await?;
        Ok(())
    }

    async fn object_lock_get(&self, key: &str) -> Result<Option<i64>, DesArcError> {
        read_soft_retain_until(&self.root, key).await
    }

    fn retention_support(&self) -> RetentionSupport {
        RetentionSupport::SoftOnly
    }
}

/// Read the soft-retention deadline recorded by `object_lock_set`, if any.
pub async fn read_soft_retain_until(root: &Path, key: &str) -> Result<Option<i64>, DesArcError> {
    let sidecar = root.join(format!("{key}.retain"));
    match tokio::fs::read_to_string(&sidecar).await {
        Ok(s) => Ok(Some(s.trim().parse().map_err(|_| {
            DesArcError::CorruptShard(format!("malformed retain sidecar for {key}"))
        })?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.put("20241115/00.des", Bytes::from_static(b"hello world")).await.unwrap();
        let got = backend.get("20241115/00.des").await.unwrap();
        assert_eq!(&got[..], b"hello world");
    }

    #[tokio::test]
    async fn get_range_reads_exact_window() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.put("a.des", Bytes::from_static(b"0123456789")).await.unwrap();
        let got = backend.get_range("a.des", ByteRange::new(3, 6)).await.unwrap();
        assert_eq!(&got[..], b"345");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        assert!(matches!(backend.get("missing").await, Err(DesArcError::NotFound(_))));
        assert!(!backend.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn object_lock_set_writes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(dir.path());
        backend.put("a.des", Bytes::from_static(b"x")).await.unwrap();
        backend.object_lock_set("a.des", 1_900_000_000).await.unwrap();
        let retain = read_soft_retain_until(dir.path(), "a.des").await.unwrap();
        assert_eq!(retain, Some(1_900_000_000));
        assert_eq!(backend.retention_support(), RetentionSupport::SoftOnly);
    }
}
