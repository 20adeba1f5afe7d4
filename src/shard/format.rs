//! Shard binary layout: `[HEADER | DATA | INDEX | FOOTER]` (`spec.md` §3).
//!
//! All multi-byte integers are big-endian — this is the one spot in the
//! crate that departs from the teacher's little-endian convention, because
//! the wire format this crate targets pins big-endian fields. The
//! "validate magic first, then size, then parse fields into a fixed
//! buffer" discipline is otherwise the same one `sixcy::block::BlockHeader`
//! and `sixcy::superblock::Superblock` use.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use crate::error::DesArcError;

pub const HEADER_MAGIC: &[u8; 4] = b"DES2";
pub const FOOTER_MAGIC: &[u8; 4] = b"DESI";
pub const HEADER_SIZE: usize = 8;
pub const FOOTER_SIZE: usize = 12;

pub const FORMAT_V1: u8 = 1;
pub const FORMAT_V2: u8 = 2;

/// Bit 0 of an index entry's `flags` byte: entry payload lives in a
/// BigFile sibling object rather than inline in DATA.
pub const FLAG_IS_BIGFILE: u8 = 0x01;

// ── Header ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ShardHeader {
    pub version: u8,
}

impl ShardHeader {
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(HEADER_MAGIC)?;
        w.write_u8(self.version)?;
        w.write_all(&[0u8; 3])
    }

    pub fn read<R: Read>(mut r: R) -> Result<Self, DesArcError> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf)
            .map_err(|e| DesArcError::CorruptShard(format!("truncated shard header: {e}")))?;
        if &buf[0..4] != HEADER_MAGIC {
            return Err(DesArcError::CorruptShard("bad shard header magic".into()));
        }
        let version = buf[4];
        if version != FORMAT_V1 && version != FORMAT_V2 {
            return Err(DesArcError::CorruptShard(format!("unsupported shard version {version}")));
        }
        Ok(Self { version })
    }
}

// ── Footer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ShardFooter {
    pub index_size: u64,
}

impl ShardFooter {
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(FOOTER_MAGIC)?;
        w.write_u64::<BigEndian>(self.index_size)
    }

    /// Parse an exact `FOOTER_SIZE`-byte buffer (the last 12 bytes of a shard object).
    pub fn parse(buf: &[u8; FOOTER_SIZE]) -> Result<Self, DesArcError> {
        if &buf[0..4] != FOOTER_MAGIC {
            return Err(DesArcError::CorruptShard("bad shard footer magic".into()));
        }
        let mut cursor = Cursor::new(&buf[4..12]);
        let index_size = cursor.read_u64::<BigEndian>()
            .map_err(|e| DesArcError::CorruptShard(format!("truncated footer: {e}")))?;
        Ok(Self { index_size })
    }
}

// ── Index entries ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub uid: Vec<u8>,
    pub payload: EntryPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPayload {
    Inline {
        offset: u64,
        length: u64,
        codec_id: u8,
        compressed_size: u64,
        uncompressed_size: u64,
        meta: Vec<u8>,
    },
    BigFile {
        hash_hex: String,
        bigfile_size: u64,
        meta: Vec<u8>,
    },
}

/// Encode one v2 index entry. Writers always emit v2, per `spec.md` §3.
pub fn encode_entry(entry: &IndexEntry) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    out.write_u16::<BigEndian>(entry.uid.len() as u16)?;
    out.write_all(&entry.uid)?;

    match &entry.payload {
        EntryPayload::BigFile { hash_hex, bigfile_size, meta } => {
            out.write_u8(FLAG_IS_BIGFILE)?;
            out.write_u16::<BigEndian>(hash_hex.len() as u16)?;
            out.write_all(hash_hex.as_bytes())?;
            out.write_u64::<BigEndian>(*bigfile_size)?;
            out.write_u32::<BigEndian>(meta.len() as u32)?;
            out.write_all(meta)?;
        }
        EntryPayload::Inline { offset, length, codec_id, compressed_size, uncompressed_size, meta } => {
            out.write_u8(0)?;
            out.write_u64::<BigEndian>(*offset)?;
            out.write_u64::<BigEndian>(*length)?;
            out.write_u8(*codec_id)?;
            out.write_u64::<BigEndian>(*compressed_size)?;
            out.write_u64::<BigEndian>(*uncompressed_size)?;
            out.write_u32::<BigEndian>(meta.len() as u32)?;
            out.write_all(meta)?;
        }
    }
    Ok(out)
}

/// Decode every entry in an INDEX section. `version` selects v1 (legacy,
/// inline-only, no flags/meta) or v2 (BigFile-aware) layout.
pub fn decode_entries(bytes: &[u8], version: u8) -> Result<Vec<IndexEntry>, DesArcError> {
    let mut cursor = Cursor::new(bytes);
    let mut entries = Vec::new();

    let err = |msg: String| DesArcError::CorruptShard(msg);

    while (cursor.position() as usize) < bytes.len() {
        let name_len = cursor.read_u16::<BigEndian>()
            .map_err(|e| err(format!("truncated index entry name_len: {e}")))?;
        let mut uid = vec![0u8; name_len as usize];
        cursor.read_exact(&mut uid)
            .map_err(|e| err(format!("truncated index entry uid: {e}")))?;

        let payload = if version == FORMAT_V1 {
            let offset = cursor.read_u64::<BigEndian>().map_err(|e| err(e.to_string()))?;
            let length = cursor.read_u64::<BigEndian>().map_err(|e| err(e.to_string()))?;
            let codec_id = cursor.read_u8().map_err(|e| err(e.to_string()))?;
            let compressed_size = cursor.read_u64::<BigEndian>().map_err(|e| err(e.to_string()))?;
            let uncompressed_size = cursor.read_u64::<BigEndian>().map_err(|e| err(e.to_string()))?;
            if crate::codec::CodecId::from_u8(codec_id).is_none() {
                return Err(err(format!("unknown codec id {codec_id} in v1 index entry")));
            }
            EntryPayload::Inline { offset, length, codec_id, compressed_size, uncompressed_size, meta: Vec::new() }
        } else {
            let flags = cursor.read_u8().map_err(|e| err(e.to_string()))?;
            if flags & FLAG_IS_BIGFILE != 0 {
                let hash_len = cursor.read_u16::<BigEndian>().map_err(|e| err(e.to_string()))?;
                let mut hash_bytes = vec![0u8; hash_len as usize];
                cursor.read_exact(&mut hash_bytes).map_err(|e| err(e.to_string()))?;
                let hash_hex = String::from_utf8(hash_bytes)
                    .map_err(|e| err(format!("non-ascii bigfile hash: {e}")))?;
                let bigfile_size = cursor.read_u64::<BigEndian>().map_err(|e| err(e.to_string()))?;
                let meta_len = cursor.read_u32::<BigEndian>().map_err(|e| err(e.to_string()))?;
                let mut meta = vec![0u8; meta_len as usize];
                cursor.read_exact(&mut meta).map_err(|e| err(e.to_string()))?;
                EntryPayload::BigFile { hash_hex, bigfile_size, meta }
            } else {
                let offset = cursor.read_u64::<BigEndian>().map_err(|e| err(e.to_string()))?;
                let length = cursor.read_u64::<BigEndian>().map_err(|e| err(e.to_string()))?;
                let codec_id = cursor.read_u8().map_err(|e| err(e.to_string()))?;
                let compressed_size = cursor.read_u64::<BigEndian>().map_err(|e| err(e.to_string()))?;
                let uncompressed_size = cursor.read_u64::<BigEndian>().map_err(|e| err(e.to_string()))?;
                let meta_len = cursor.read_u32::<BigEndian>().map_err(|e| err(e.to_string()))?;
                let mut meta = vec![0u8; meta_len as usize];
                cursor.read_exact(&mut meta).map_err(|e| err(e.to_string()))?;
                if crate::codec::CodecId::from_u8(codec_id).is_none() {
                    return Err(err(format!("unknown codec id {codec_id} in index entry")));
                }
                EntryPayload::Inline { offset, length, codec_id, compressed_size, uncompressed_size, meta }
            }
        };

        entries.push(IndexEntry { uid, payload });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let h = ShardHeader { version: FORMAT_V2 };
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        let parsed = ShardHeader::read(Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.version, FORMAT_V2);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let buf = [0u8; HEADER_SIZE];
        assert!(ShardHeader::read(Cursor::new(&buf)).is_err());
    }

    #[test]
    fn footer_roundtrip() {
        let f = ShardFooter { index_size: 12345 };
        let mut buf = Vec::new();
        f.write(&mut buf).unwrap();
        let arr: [u8; FOOTER_SIZE] = buf.try_into().unwrap();
        let parsed = ShardFooter::parse(&arr).unwrap();
        assert_eq!(parsed.index_size, 12345);
    }

    #[test]
    fn footer_rejects_bad_magic() {
        let buf = [0u8; FOOTER_SIZE];
        assert!(ShardFooter::parse(&buf).is_err());
    }

    #[test]
    fn inline_entry_roundtrip() {
        let entry = IndexEntry {
            uid: b"file-1".to_vec(),
            payload: EntryPayload::Inline {
                offset: 8,
                length: 20,
                codec_id: 1,
                compressed_size: 20,
                uncompressed_size: 30,
                meta: b"{}".to_vec(),
            },
        };
        let bytes = encode_entry(&entry).unwrap();
        let decoded = decode_entries(&bytes, FORMAT_V2).unwrap();
        assert_eq!(decoded, vec![entry]);
    }

    #[test]
    fn bigfile_entry_roundtrip() {
        let entry = IndexEntry {
            uid: b"huge-file".to_vec(),
            payload: EntryPayload::BigFile {
                hash_hex: "a".repeat(64),
                bigfile_size: 20 * 1024 * 1024,
                meta: Vec::new(),
            },
        };
        let bytes = encode_entry(&entry).unwrap();
        let decoded = decode_entries(&bytes, FORMAT_V2).unwrap();
        assert_eq!(decoded, vec![entry]);
    }

    #[test]
    fn v1_entry_has_no_meta_or_flags() {
        // Hand-build a v1 inline entry: name_len+uid+offset+length+codec_id+comp+uncomp
        let mut buf = Vec::new();
        buf.write_u16::<BigEndian>(3).unwrap();
        buf.write_all(b"abc").unwrap();
        buf.write_u64::<BigEndian>(0).unwrap();
        buf.write_u64::<BigEndian>(5).unwrap();
        buf.write_u8(0).unwrap();
        buf.write_u64::<BigEndian>(5).unwrap();
        buf.write_u64::<BigEndian>(5).unwrap();

        let decoded = decode_entries(&buf, FORMAT_V1).unwrap();
        assert_eq!(decoded.len(), 1);
        match &decoded[0].payload {
            EntryPayload::Inline { meta, .. } => assert!(meta.is_empty()),
            _ => panic!("expected inline entry"),
        }
    }

    #[test]
    fn multiple_entries_decode_in_order() {
        let e1 = IndexEntry {
            uid: b"a".to_vec(),
            payload: EntryPayload::Inline {
                offset: 0, length: 1, codec_id: 0, compressed_size: 1, uncompressed_size: 1, meta: Vec::new(),
            },
        };
        let e2 = IndexEntry {
            uid: b"b".to_vec(),
            payload: EntryPayload::Inline {
                offset: 1, length: 2, codec_id: 0, compressed_size: 2, uncompressed_size: 2, meta: Vec::new(),
            },
        };
        let mut bytes = encode_entry(&e1).unwrap();
        bytes.extend(encode_entry(&e2).unwrap());
        let decoded = decode_entries(&bytes, FORMAT_V2).unwrap();
        assert_eq!(decoded, vec![e1, e2]);
    }
}
