//! Shard container format and I/O (`spec.md` §4.3, §4.4).

pub mod format;
pub mod reader;
pub mod writer;

pub use format::{EntryPayload, IndexEntry, ShardFooter, ShardHeader};
pub use reader::{fetch_index, fetch_payload, get_cold, ParsedIndex};
pub use writer::{CloseResult, ShardWriter};
