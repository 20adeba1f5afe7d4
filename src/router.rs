//! Deterministic routing (`spec.md` §4.1).
//!
//! `locate` is pure: no I/O, no shared state. It is the one function every
//! other component — planner, writer, retrieval engine, zone dispatcher —
//! calls to agree on where a `(uid, created_at)` pair lives.

use chrono::{DateTime, Utc};
use crc32fast::Hasher;

use crate::error::DesArcError;

pub const MIN_N_BITS: u8 = 4;
pub const MAX_N_BITS: u8 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLocation {
    pub date_dir: String,
    pub shard_index: u32,
    pub shard_hex: String,
    pub object_key: String,
}

/// CRC32-IEEE (polynomial 0xEDB88320) over raw UID bytes, masked to
/// `n_bits`. This is the one hash every implementation of this format
/// must use to stay cross-language-deterministic — see `spec.md` §4.1
/// and the Open Questions in §9.
fn shard_index_for(uid: &[u8], n_bits: u8) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(uid);
    let crc = hasher.finalize();
    let mask = (1u32 << n_bits) - 1;
    crc & mask
}

fn hex_width(n_bits: u8) -> usize {
    ((n_bits as usize) + 3) / 4
}

/// Map `(uid, created_at, n_bits)` to a concrete shard location.
///
/// Fails only on `n_bits` out of `[4, 16]` or an empty `uid`.
pub fn locate(uid: &[u8], created_at: DateTime<Utc>, n_bits: u8) -> Result<ShardLocation, DesArcError> {
    if uid.is_empty() {
        return Err(DesArcError::InvalidInput("uid must not be empty".into()));
    }
    if !(MIN_N_BITS..=MAX_N_BITS).contains(&n_bits) {
        return Err(DesArcError::InvalidInput(format!(
            "n_bits {n_bits} out of range [{MIN_N_BITS}, {MAX_N_BITS}]"
        )));
    }

    let date_dir = created_at.format("%Y%m%d").to_string();
    let shard_index = shard_index_for(uid, n_bits);
    let shard_hex = format!("{:0width$x}", shard_index, width = hex_width(n_bits));
    let object_key = format!("{date_dir}/{shard_hex}.des");

    Ok(ShardLocation { date_dir, shard_index, shard_hex, object_key })
}
