//! Migration driver contract (`spec.md` §6, §9).
//!
//! The core exposes exactly one entry point to an external migration
//! driver: `pack`. The driver produces the manifest from its own source
//! of truth and advances its own cutoff/watermark after `pack` returns
//! successfully; this crate never reads or writes that watermark.

use std::sync::Arc;

use crate::backend::Backend;
use crate::config::{CompressionConfig, RouterConfig, StorageConfig};
use crate::error::DesArcError;
use crate::planner::{pack, FileToPack, PackResult};

/// A source of files to archive, handed to `pack` by the driver. The
/// driver owns iteration order and any pagination against its own store;
/// this crate only consumes the sequence.
pub trait ManifestSource: IntoIterator<Item = FileToPack> {}
impl<T: IntoIterator<Item = FileToPack>> ManifestSource for T {}

pub struct MigrationConfig {
    pub router: RouterConfig,
    pub compression: CompressionConfig,
    pub storage: StorageConfig,
}

/// Run one packing pass. The driver is responsible for calling this
/// repeatedly with fresh manifests and for advancing its own cutoff only
/// after a returned `PackResult` has been accepted.
pub async fn run_migration_pass(
    backend: Arc<dyn Backend>,
    manifest: impl ManifestSource,
    config: &MigrationConfig,
) -> Result<PackResult, DesArcError> {
    pack(backend, manifest, &config.router, &config.compression, &config.storage).await
}
