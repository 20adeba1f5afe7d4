//! Shard writer (`spec.md` §4.3).
//!
//! One `open` call builds exactly one physical shard object; the planner
//! decides when to roll to a new one. State machine is OPEN → CLOSING →
//! CLOSED, same three-state discipline the teacher uses for its own
//! writer/reader pairing in `sixcy::io_stream`, adapted to this format's
//! big-endian header/index/footer instead of per-block BLAKE3 framing.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::backend::Backend;
use crate::codec::get_codec;
use crate::config::{CompressionConfig, StorageConfig};
use crate::error::DesArcError;
use crate::shard::format::{encode_entry, EntryPayload, IndexEntry, ShardFooter, ShardHeader, FOOTER_SIZE, FORMAT_V2, HEADER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Closing,
    Closed,
}

pub struct CloseResult {
    pub object_key: String,
    pub bytes_written: u64,
    pub entries: usize,
}

pub struct ShardWriter {
    backend: Arc<dyn Backend>,
    object_key: String,
    compression: CompressionConfig,
    storage: StorageConfig,
    data: Vec<u8>,
    entries: Vec<IndexEntry>,
    state: State,
}

impl ShardWriter {
    pub fn open(
        backend: Arc<dyn Backend>,
        object_key: impl Into<String>,
        compression: CompressionConfig,
        storage: StorageConfig,
    ) -> Self {
        Self {
            backend,
            object_key: object_key.into(),
            compression,
            storage,
            data: Vec::new(),
            entries: Vec::new(),
            state: State::Open,
        }
    }

    /// Bytes committed to the DATA section so far. Used by the planner to
    /// decide when the next append would overflow `max_shard_size_bytes`;
    /// BigFile payloads are excluded since they never enter DATA.
    pub fn current_data_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn require_open(&self) -> Result<(), DesArcError> {
        if self.state != State::Open {
            return Err(DesArcError::InvalidInput(format!(
                "append called on writer in state {:?}", self.state
            )));
        }
        Ok(())
    }

    /// Append one `(uid, payload, meta)` record. Chooses inline vs BigFile
    /// per `spec.md` §4.3 step 1 and applies the compression skip heuristic
    /// (§4.2) for the inline path.
    pub async fn append(&mut self, uid: &[u8], payload: &[u8], meta: Vec<u8>) -> Result<(), DesArcError> {
        self.require_open()?;
        if uid.is_empty() {
            return Err(DesArcError::InvalidInput("uid must not be empty".into()));
        }

        if payload.len() as u64 >= self.storage.bigfile_threshold_bytes {
            self.append_bigfile(uid, payload, meta).await
        } else {
            self.append_inline(uid, payload, meta)
        }
    }

    fn append_inline(&mut self, uid: &[u8], payload: &[u8], meta: Vec<u8>) -> Result<(), DesArcError> {
        let (codec_id, body) = self.encode_with_skip_heuristic(uid, payload);

        let projected = self.data.len() as u64 + body.len() as u64;
        if projected > self.storage.max_shard_size_bytes {
            return Err(DesArcError::ShardTooLarge(format!(
                "appending {} bytes would exceed max shard size {}",
                body.len(), self.storage.max_shard_size_bytes
            )));
        }

        let offset = (HEADER_SIZE as u64) + self.data.len() as u64;
        let length = body.len() as u64;
        self.data.extend_from_slice(&body);

        self.entries.push(IndexEntry {
            uid: uid.to_vec(),
            payload: EntryPayload::Inline {
                offset,
                length,
                codec_id,
                compressed_size: length,
                uncompressed_size: payload.len() as u64,
                meta,
            },
        });
        Ok(())
    }

    async fn append_bigfile(&mut self, uid: &[u8], payload: &[u8], meta: Vec<u8>) -> Result<(), DesArcError> {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        let hash_hex = hex::encode(hasher.finalize());

        let sibling_key = format!("{}/{}", self.storage.bigfiles_prefix, hash_hex);
        if !self.backend.exists(&sibling_key).await? {
            self.backend.put(&sibling_key, Bytes::copy_from_slice(payload)).await?;
        }

        self.entries.push(IndexEntry {
            uid: uid.to_vec(),
            payload: EntryPayload::BigFile {
                hash_hex,
                bigfile_size: payload.len() as u64,
                meta,
            },
        });
        Ok(())
    }

    /// Extension-based skip set, size floor, and trial-ratio bailout, in
    /// that order, exactly as `spec.md` §4.2 lists them.
    fn encode_with_skip_heuristic(&self, uid: &[u8], payload: &[u8]) -> (u8, Vec<u8>) {
        let none_id = crate::codec::CodecId::None.as_u8();

        if (payload.len() as u64) < self.compression.min_size_bytes {
            return (none_id, payload.to_vec());
        }
        if let Some(ext) = extension_of(uid) {
            if self.compression.skip_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
                return (none_id, payload.to_vec());
            }
        }

        let codec = get_codec(self.compression.codec);
        match codec.encode(payload, self.compression.level) {
            Ok(compressed) => {
                let ratio = compressed.len() as f64 / payload.len().max(1) as f64;
                if ratio > self.compression.min_ratio {
                    (none_id, payload.to_vec())
                } else {
                    (codec.codec_id().as_u8(), compressed)
                }
            }
            Err(_) => (none_id, payload.to_vec()),
        }
    }

    /// Emit INDEX then FOOTER and publish the finished object.
    pub async fn close(mut self) -> Result<CloseResult, DesArcError> {
        self.require_open()?;
        self.state = State::Closing;

        let mut out = Vec::with_capacity(HEADER_SIZE + self.data.len() + FOOTER_SIZE);
        ShardHeader { version: FORMAT_V2 }.write(&mut out)?;
        out.extend_from_slice(&self.data);

        let index_start = out.len();
        for entry in &self.entries {
            out.extend(encode_entry(entry)?);
        }
        let index_size = (out.len() - index_start) as u64;
        ShardFooter { index_size }.write(&mut out)?;

        let bytes_written = out.len() as u64;
        self.backend.put(&self.object_key, Bytes::from(out)).await?;
        self.state = State::Closed;

        Ok(CloseResult {
            object_key: self.object_key,
            bytes_written,
            entries: self.entries.len(),
        })
    }
}

fn extension_of(uid: &[u8]) -> Option<String> {
    let s = std::str::from_utf8(uid).ok()?;
    let dot = s.rfind('.')?;
    if dot == s.len() - 1 {
        return None;
    }
    Some(s[dot + 1..].to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::LocalBackend;
    use crate::codec::CodecId;
    use crate::shard::format::{decode_entries, ShardHeader as Hdr};

    fn cfg() -> (CompressionConfig, StorageConfig) {
        (
            CompressionConfig { codec: CodecId::None, level: 0, min_size_bytes: 0, min_ratio: 1.1, skip_extensions: vec![] },
            StorageConfig { bigfile_threshold_bytes: 1024, bigfiles_prefix: "_bigFiles".into(), overlay_prefix: "_ext_retention".into(), max_shard_size_bytes: 1 << 20 },
        )
    }

    #[tokio::test]
    async fn pack_three_tiny_files_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(LocalBackend::new(dir.path()));
        let (comp, storage) = cfg();
        let mut w = ShardWriter::open(backend.clone(), "20240115/00.des", comp, storage);

        w.append(b"uid-1", b"a", vec![]).await.unwrap();
        w.append(b"uid-2", b"bb", vec![]).await.unwrap();
        w.append(b"uid-3", b"ccc", vec![]).await.unwrap();
        let result = w.close().await.unwrap();
        assert_eq!(result.entries, 3);

        let bytes = backend.get("20240115/00.des").await.unwrap();
        Hdr::read(std::io::Cursor::new(&bytes[0..8])).unwrap();
        let footer_arr: [u8; FOOTER_SIZE] = bytes[bytes.len() - FOOTER_SIZE..].try_into().unwrap();
        let footer = ShardFooter::parse(&footer_arr).unwrap();
        let index_start = bytes.len() - FOOTER_SIZE - footer.index_size as usize;
        let entries = decode_entries(&bytes[index_start..bytes.len() - FOOTER_SIZE], FORMAT_V2).unwrap();
        assert_eq!(entries.len(), 3);
        match &entries[1].payload {
            EntryPayload::Inline { offset, length, .. } => {
                let body = &bytes[*offset as usize..(*offset + *length) as usize];
                assert_eq!(body, b"bb");
            }
            _ => panic!("expected inline entry"),
        }
    }

    #[tokio::test]
    async fn bigfile_externalization_empties_data_section() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(LocalBackend::new(dir.path()));
        let (comp, storage) = cfg();
        let payload = vec![7u8; 2048];
        let mut w = ShardWriter::open(backend.clone(), "20240115/00.des", comp, storage);
        w.append(b"huge", &payload, vec![]).await.unwrap();
        let result = w.close().await.unwrap();
        assert_eq!(result.entries, 1);

        let bytes = backend.get("20240115/00.des").await.unwrap();
        let footer_arr: [u8; FOOTER_SIZE] = bytes[bytes.len() - FOOTER_SIZE..].try_into().unwrap();
        let footer = ShardFooter::parse(&footer_arr).unwrap();
        let index_start = bytes.len() - FOOTER_SIZE - footer.index_size as usize;
        assert_eq!(index_start, HEADER_SIZE);

        let mut hasher = Sha256::new();
        hasher.update(&payload);
        let hash_hex = hex::encode(hasher.finalize());
        let sibling = backend.get(&format!("_bigFiles/{hash_hex}")).await.unwrap();
        assert_eq!(&sibling[..], &payload[..]);
    }

    #[tokio::test]
    async fn boundary_exactly_at_threshold_is_bigfile() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(LocalBackend::new(dir.path()));
        let (comp, storage) = cfg();
        let at_threshold = vec![1u8; storage.bigfile_threshold_bytes as usize];
        let mut w = ShardWriter::open(backend.clone(), "a.des", comp.clone(), storage.clone());
        w.append(b"x", &at_threshold, vec![]).await.unwrap();
        let result = w.close().await.unwrap();
        let bytes = backend.get("a.des").await.unwrap();
        let footer_arr: [u8; FOOTER_SIZE] = bytes[bytes.len() - FOOTER_SIZE..].try_into().unwrap();
        let footer = ShardFooter::parse(&footer_arr).unwrap();
        let index_start = bytes.len() - FOOTER_SIZE - footer.index_size as usize;
        assert_eq!(index_start, HEADER_SIZE, "at-threshold payload must take the bigfile path");
        assert_eq!(result.entries, 1);

        let below = vec![1u8; storage.bigfile_threshold_bytes as usize - 1];
        let mut w2 = ShardWriter::open(backend.clone(), "b.des", comp, storage.clone());
        w2.append(b"y", &below, vec![]).await.unwrap();
        w2.close().await.unwrap();
        let bytes2 = backend.get("b.des").await.unwrap();
        let footer_arr2: [u8; FOOTER_SIZE] = bytes2[bytes2.len() - FOOTER_SIZE..].try_into().unwrap();
        let footer2 = ShardFooter::parse(&footer_arr2).unwrap();
        let index_start2 = bytes2.len() - FOOTER_SIZE - footer2.index_size as usize;
        assert!(index_start2 > HEADER_SIZE, "below-threshold payload must be inline");
    }

    #[tokio::test]
    async fn min_size_bytes_boundary_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(LocalBackend::new(dir.path()));
        let compressible = b"the quick brown fox jumps over the lazy dog ".repeat(100);
        let comp = CompressionConfig {
            codec: CodecId::Zstd, level: 3,
            min_size_bytes: compressible.len() as u64,
            min_ratio: 1.1, skip_extensions: vec![],
        };
        let storage = StorageConfig { bigfile_threshold_bytes: 1 << 30, bigfiles_prefix: "_bigFiles".into(), overlay_prefix: "_ext_retention".into(), max_shard_size_bytes: 1 << 20 };

        // Exactly at min_size_bytes: not "below" it, so the size-floor skip
        // must not apply and the payload must go through the codec.
        let mut w = ShardWriter::open(backend.clone(), "at.des", comp.clone(), storage.clone());
        w.append(b"at-floor", &compressible, vec![]).await.unwrap();
        w.close().await.unwrap();
        let bytes = backend.get("at.des").await.unwrap();
        let footer_arr: [u8; FOOTER_SIZE] = bytes[bytes.len() - FOOTER_SIZE..].try_into().unwrap();
        let footer = ShardFooter::parse(&footer_arr).unwrap();
        let index_start = bytes.len() - FOOTER_SIZE - footer.index_size as usize;
        let entries = decode_entries(&bytes[index_start..bytes.len() - FOOTER_SIZE], FORMAT_V2).unwrap();
        match &entries[0].payload {
            EntryPayload::Inline { codec_id, .. } => assert_eq!(*codec_id, CodecId::Zstd.as_u8()),
            _ => panic!("expected inline entry"),
        }

        // One byte below min_size_bytes: the size floor applies, forcing none.
        let below = compressible[..compressible.len() - 1].to_vec();
        let mut w2 = ShardWriter::open(backend.clone(), "below.des", comp, storage);
        w2.append(b"below-floor", &below, vec![]).await.unwrap();
        w2.close().await.unwrap();
        let bytes2 = backend.get("below.des").await.unwrap();
        let footer_arr2: [u8; FOOTER_SIZE] = bytes2[bytes2.len() - FOOTER_SIZE..].try_into().unwrap();
        let footer2 = ShardFooter::parse(&footer_arr2).unwrap();
        let index_start2 = bytes2.len() - FOOTER_SIZE - footer2.index_size as usize;
        let entries2 = decode_entries(&bytes2[index_start2..bytes2.len() - FOOTER_SIZE], FORMAT_V2).unwrap();
        match &entries2[0].payload {
            EntryPayload::Inline { codec_id, .. } => assert_eq!(*codec_id, CodecId::None.as_u8()),
            _ => panic!("expected inline entry"),
        }
    }

    #[tokio::test]
    async fn duplicate_uid_keeps_both_entries_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(LocalBackend::new(dir.path()));
        let (comp, storage) = cfg();
        let mut w = ShardWriter::open(backend.clone(), "a.des", comp, storage);
        w.append(b"dup", b"first", vec![]).await.unwrap();
        w.append(b"dup", b"second", vec![]).await.unwrap();
        let result = w.close().await.unwrap();
        assert_eq!(result.entries, 2);
    }

    #[tokio::test]
    async fn append_after_close_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(LocalBackend::new(dir.path()));
        let (comp, storage) = cfg();
        let mut w = ShardWriter::open(backend, "a.des", comp, storage);
        w.append(b"a", b"x", vec![]).await.unwrap();
        // close consumes self; a second append on the same handle is
        // impossible to write at the type level, which is the point.
        let _ = w.close().await.unwrap();
    }

    #[tokio::test]
    async fn oversized_single_append_is_shard_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(LocalBackend::new(dir.path()));
        let mut comp = cfg().0;
        comp.min_ratio = 1.1;
        let storage = StorageConfig {
            bigfile_threshold_bytes: 1_000_000,
            bigfiles_prefix: "_bigFiles".into(),
            overlay_prefix: "_ext_retention".into(),
            max_shard_size_bytes: 100,
        };
        let mut w = ShardWriter::open(backend, "a.des", comp, storage);
        let big_inline = vec![0u8; 200];
        assert!(matches!(
            w.append(b"x", &big_inline, vec![]).await,
            Err(DesArcError::ShardTooLarge(_))
        ));
    }
}
