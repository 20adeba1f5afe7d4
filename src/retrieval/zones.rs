//! Multi-zone dispatcher (`spec.md` §4.8).
//!
//! A static, non-overlapping list of `{start, end, backend}` triples over
//! `[0, 2^n_bits)`. Validated once at construction; binary-searched on
//! every `get`. No cross-zone fallback: a zone outage affects only the
//! shard indices it owns.

use chrono::{DateTime, Utc};

use crate::error::DesArcError;
use crate::retrieval::engine::RetrievalEngine;
use crate::router::locate;

pub struct Zone {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub engine: RetrievalEngine,
}

pub struct ZoneDispatcher {
    n_bits: u8,
    zones: Vec<Zone>,
}

impl ZoneDispatcher {
    /// Validates full, gapless, non-overlapping coverage of `[0, 2^n_bits)`.
    pub fn new(n_bits: u8, mut zones: Vec<Zone>) -> Result<Self, DesArcError> {
        if zones.is_empty() {
            return Err(DesArcError::InvalidInput("zone map must have at least one zone".into()));
        }
        zones.sort_by_key(|z| z.start);

        let span = 1u64 << n_bits;
        let mut cursor: u64 = 0;
        for zone in &zones {
            if zone.start as u64 != cursor {
                return Err(DesArcError::InvalidInput(format!(
                    "zone map has a gap or overlap before zone '{}' (expected start {cursor}, got {})",
                    zone.name, zone.start
                )));
            }
            if zone.end <= zone.start {
                return Err(DesArcError::InvalidInput(format!("zone '{}' has empty or inverted range", zone.name)));
            }
            cursor = zone.end as u64 + 1;
        }
        if cursor != span {
            return Err(DesArcError::InvalidInput(format!(
                "zone map covers up to {} but n_bits={n_bits} requires coverage to {}", cursor - 1, span - 1
            )));
        }

        Ok(Self { n_bits, zones })
    }

    fn zone_for(&self, shard_index: u32) -> &Zone {
        let idx = self.zones.partition_point(|z| z.end < shard_index);
        &self.zones[idx]
    }

    pub async fn get(&self, uid: &[u8], created_at: DateTime<Utc>) -> Result<Vec<u8>, DesArcError> {
        let loc = locate(uid, created_at, self.n_bits)?;
        let zone = self.zone_for(loc.shard_index);
        zone.engine.get(uid, created_at).await
    }
}
