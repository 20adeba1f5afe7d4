//! Typed configuration shapes.
//!
//! Parsing an actual YAML/JSON config *file* is out of scope (see
//! `spec.md` §1); these structs are what a caller's config loader
//! deserializes into via `serde`. All defaults mirror `spec.md` §6.

use serde::{Deserialize, Serialize};

use crate::codec::CodecId;

/// Bits of the shard index space: `2^n_bits` shards exist per calendar day.
pub const DEFAULT_N_BITS: u8 = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub n_bits: u8,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { n_bits: DEFAULT_N_BITS }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub codec: CodecId,
    pub level: i32,
    pub min_size_bytes: u64,
    pub min_ratio: f64,
    pub skip_extensions: Vec<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CodecId::Zstd,
            level: 3,
            min_size_bytes: 512,
            min_ratio: 0.90,
            skip_extensions: vec![
                "jpg".into(), "jpeg".into(), "png".into(), "gif".into(),
                "mp4".into(), "mov".into(), "mp3".into(), "zip".into(),
                "gz".into(), "zst".into(), "7z".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bigfile_threshold_bytes: u64,
    pub bigfiles_prefix: String,
    pub overlay_prefix: String,
    pub max_shard_size_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bigfile_threshold_bytes: 10 * 1024 * 1024,
            bigfiles_prefix: "_bigFiles".to_string(),
            overlay_prefix: "_ext_retention".to_string(),
            max_shard_size_bytes: 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneRangeConfig {
    pub name: String,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ZoneConfig {
    pub n_bits: u8,
    pub zones: Vec<ZoneRangeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub index_cache_entries: usize,
    pub index_cache_max_bytes: u64,
    pub index_cache_ttl_secs: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_cache_entries: 4096,
            index_cache_max_bytes: 256 * 1024 * 1024,
            index_cache_ttl_secs: None,
        }
    }
}
