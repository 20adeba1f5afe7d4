//! Shard reader: the three-range-GET protocol (`spec.md` §4.4).
//!
//! Stateless with respect to the shard object; callers (the retrieval
//! engine) own the index cache and pass a previously parsed `ParsedIndex`
//! back in to skip straight to the payload range.

use std::sync::Arc;

use crate::backend::{Backend, ByteRange};
use crate::codec::get_codec_by_id;
use crate::error::DesArcError;
use crate::retry::with_backend_retry;
use crate::shard::format::{decode_entries, EntryPayload, IndexEntry, ShardFooter, FOOTER_SIZE, FORMAT_V2, HEADER_SIZE};

#[derive(Debug)]
pub struct ParsedIndex {
    pub entries: Vec<IndexEntry>,
    pub data_start: u64,
    pub version: u8,
}

impl ParsedIndex {
    /// Estimated resident size, for the LRU cache's byte budget.
    pub fn estimated_bytes(&self) -> usize {
        self.entries.iter().map(|e| match &e.payload {
            EntryPayload::Inline { meta, .. } => 64 + meta.len(),
            EntryPayload::BigFile { hash_hex, meta, .. } => 48 + hash_hex.len() + meta.len(),
        }).sum::<usize>() + self.entries.len() * 16
    }
}

/// Writers always emit v2 (`spec.md` §3); legacy v1 shards must be named
/// explicitly by the caller rather than auto-detected, which would cost
/// an extra header range GET on every cold read and break the
/// exactly-three-range-GET budget (`spec.md` §8).
pub async fn fetch_index(backend: &dyn Backend, object_key: &str, version: u8) -> Result<ParsedIndex, DesArcError> {
    let meta = backend.head(object_key).await?;
    let file_size = meta.size;
    if file_size < (HEADER_SIZE + FOOTER_SIZE) as u64 {
        return Err(DesArcError::CorruptShard(format!(
            "shard {object_key} is {file_size} bytes, smaller than header+footer"
        )));
    }

    let footer_bytes = with_backend_retry(|| {
        backend.get_range(object_key, ByteRange::new(file_size - FOOTER_SIZE as u64, file_size))
    }).await?;
    let footer_arr: [u8; FOOTER_SIZE] = footer_bytes.as_ref().try_into()
        .map_err(|_| DesArcError::CorruptShard(format!("short footer read on {object_key}")))?;
    let footer = ShardFooter::parse(&footer_arr)?;

    let index_start = file_size
        .checked_sub(FOOTER_SIZE as u64)
        .and_then(|v| v.checked_sub(footer.index_size))
        .ok_or_else(|| DesArcError::CorruptShard(format!("index_size exceeds object size in {object_key}")))?;
    if index_start < HEADER_SIZE as u64 {
        return Err(DesArcError::CorruptShard(format!("index overlaps header in {object_key}")));
    }

    let index_bytes = with_backend_retry(|| {
        backend.get_range(object_key, ByteRange::new(index_start, index_start + footer.index_size))
    }).await?;
    let entries = decode_entries(&index_bytes, version)?;

    Ok(ParsedIndex { entries, data_start: HEADER_SIZE as u64, version })
}

/// Resolve `uid` against an already-parsed index and fetch its payload.
/// Issues exactly one range GET (inline) or one whole-object GET (BigFile).
pub async fn fetch_payload(
    backend: &dyn Backend,
    object_key: &str,
    bigfiles_prefix: &str,
    index: &ParsedIndex,
    uid: &[u8],
) -> Result<Vec<u8>, DesArcError> {
    let entry = index.entries.iter().rev().find(|e| e.uid == uid)
        .ok_or_else(|| DesArcError::NotFound(format!("uid not present in shard {object_key}")))?;

    match &entry.payload {
        EntryPayload::Inline { offset, length, codec_id, uncompressed_size, .. } => {
            let range = ByteRange::new(*offset, offset + length);
            let raw = with_backend_retry(|| backend.get_range(object_key, range)).await?;
            let codec = get_codec_by_id(*codec_id)
                .map_err(|e| DesArcError::CorruptShard(format!("{object_key}: {e}")))?;
            let decoded = codec.decode(&raw)
                .map_err(|e| DesArcError::CorruptShard(format!("{object_key}: {e}")))?;
            if decoded.len() as u64 != *uncompressed_size {
                return Err(DesArcError::CorruptShard(format!(
                    "{object_key}: decoded length {} != recorded uncompressed_size {}",
                    decoded.len(), uncompressed_size
                )));
            }
            Ok(decoded)
        }
        EntryPayload::BigFile { hash_hex, bigfile_size, .. } => {
            let sibling_key = format!("{bigfiles_prefix}/{hash_hex}");
            let data = with_backend_retry(|| backend.get(&sibling_key)).await?;
            if data.len() as u64 != *bigfile_size {
                return Err(DesArcError::CorruptShard(format!(
                    "bigfile {sibling_key}: size {} != recorded {}", data.len(), bigfile_size
                )));
            }
            Ok(data.to_vec())
        }
    }
}

/// Cold read: fetch index then payload. Used when nothing is cached.
pub async fn get_cold(
    backend: &dyn Backend,
    object_key: &str,
    bigfiles_prefix: &str,
    uid: &[u8],
) -> Result<(Vec<u8>, Arc<ParsedIndex>), DesArcError> {
    let index = Arc::new(fetch_index(backend, object_key, FORMAT_V2).await?);
    let bytes = fetch_payload(backend, object_key, bigfiles_prefix, &index, uid).await?;
    Ok((bytes, index))
}
