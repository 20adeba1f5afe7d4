//! Compression codec adapter (`spec.md` §4.2).
//!
//! Encodes/decodes one byte sequence at a time. The adapter knows nothing
//! about shard entries or the skip heuristic — that lives in
//! `shard::writer`, which is the only caller that needs to decide whether
//! to compress at all.

use serde::{Deserialize, Serialize};

/// Codec identifier as stored in a v2 index entry's `codec_id` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecId {
    None,
    Zstd,
    Lz4,
}

impl CodecId {
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            CodecId::None => 0,
            CodecId::Zstd => 1,
            CodecId::Lz4 => 2,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(CodecId::None),
            1 => Some(CodecId::Zstd),
            2 => Some(CodecId::Lz4),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecId::None => "none",
            CodecId::Zstd => "zstd",
            CodecId::Lz4 => "lz4",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("compression error: {0}")]
    Compression(String),
    #[error("decompression error: {0}")]
    Decompression(String),
    #[error("unknown codec id {0}")]
    UnknownCodec(u8),
}

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;
    fn encode(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

pub struct NoneCodec;
impl Codec for NoneCodec {
    fn codec_id(&self) -> CodecId { CodecId::None }
    fn encode(&self, data: &[u8], _level: i32) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

pub struct ZstdCodec;
impl Codec for ZstdCodec {
    fn codec_id(&self) -> CodecId { CodecId::Zstd }
    fn encode(&self, data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(data, level).map_err(|e| CodecError::Compression(e.to_string()))
    }
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub struct Lz4Codec;
impl Codec for Lz4Codec {
    fn codec_id(&self) -> CodecId { CodecId::Lz4 }
    fn encode(&self, data: &[u8], _level: i32) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::compress_prepend_size(data))
    }
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}

pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::None => Box::new(NoneCodec),
        CodecId::Zstd => Box::new(ZstdCodec),
        CodecId::Lz4 => Box::new(Lz4Codec),
    }
}

/// Resolve a `codec_id` byte read from an index entry to a codec impl.
pub fn get_codec_by_id(id: u8) -> Result<Box<dyn Codec>, CodecError> {
    CodecId::from_u8(id).map(get_codec).ok_or(CodecError::UnknownCodec(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_roundtrip() {
        let c = NoneCodec;
        let data = b"hello world";
        let enc = c.encode(data, 0).unwrap();
        assert_eq!(enc, data);
        assert_eq!(c.decode(&enc).unwrap(), data);
    }

    #[test]
    fn zstd_roundtrip() {
        let c = ZstdCodec;
        let data = b"the quick brown fox jumps over the lazy dog ".repeat(100);
        let enc = c.encode(&data, 3).unwrap();
        assert!(enc.len() < data.len());
        assert_eq!(c.decode(&enc).unwrap(), data);
    }

    #[test]
    fn lz4_roundtrip() {
        let c = Lz4Codec;
        let data = b"the quick brown fox jumps over the lazy dog ".repeat(100);
        let enc = c.encode(&data, 0).unwrap();
        assert_eq!(c.decode(&enc).unwrap(), data);
    }

    #[test]
    fn unknown_codec_id_rejected() {
        assert!(get_codec_by_id(99).is_err());
    }
}
