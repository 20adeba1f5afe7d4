//! Extended-retention overlay manager (`spec.md` §4.9).
//!
//! Owns the copy-on-first-extend / update-on-subsequent state machine.
//! Does not depend on the retrieval engine: the one-time copy-out reads
//! the shard directly (router + `shard::reader`), matching §4.9's "bypass
//! the overlay probe" instruction, which would otherwise recurse back
//! into this same manager.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::backend::Backend;
use crate::error::DesArcError;
use crate::router::locate;
use crate::shard::reader::get_cold;

const CLOCK_SKEW_TOLERANCE_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionAction {
    Moved,
    Updated,
}

pub struct RetentionManager {
    shard_backend: std::sync::Arc<dyn Backend>,
    overlay_backend: std::sync::Arc<dyn Backend>,
    overlay_prefix: String,
    bigfiles_prefix: String,
    n_bits: u8,
}

impl RetentionManager {
    pub fn new(
        shard_backend: std::sync::Arc<dyn Backend>,
        overlay_backend: std::sync::Arc<dyn Backend>,
        overlay_prefix: impl Into<String>,
        bigfiles_prefix: impl Into<String>,
        n_bits: u8,
    ) -> Self {
        Self {
            shard_backend,
            overlay_backend,
            overlay_prefix: overlay_prefix.into(),
            bigfiles_prefix: bigfiles_prefix.into(),
            n_bits,
        }
    }

    fn overlay_key(&self, uid: &[u8], created_at: DateTime<Utc>) -> Result<String, DesArcError> {
        let date_dir = created_at.format("%Y%m%d").to_string();
        let uid_str = std::str::from_utf8(uid)
            .map_err(|e| DesArcError::InvalidInput(format!("uid is not valid utf-8: {e}")))?;
        Ok(format!("{}/{date_dir}/{uid_str}_{}.dat", self.overlay_prefix, created_at.to_rfc3339()))
    }

    /// Probe the overlay for `(uid, created_at)`. Used by the retrieval
    /// engine before falling through to the shard (§4.7 step 1).
    pub async fn probe(&self, uid: &[u8], created_at: DateTime<Utc>) -> Result<Option<Bytes>, DesArcError> {
        let key = self.overlay_key(uid, created_at)?;
        if self.overlay_backend.exists(&key).await? {
            Ok(Some(self.overlay_backend.get(&key).await?))
        } else {
            Ok(None)
        }
    }

    pub async fn set_retention(
        &self,
        uid: &[u8],
        created_at: DateTime<Utc>,
        retain_until: DateTime<Utc>,
    ) -> Result<RetentionAction, DesArcError> {
        let now = Utc::now();
        if retain_until <= now - chrono::Duration::seconds(CLOCK_SKEW_TOLERANCE_SECS) {
            return Err(DesArcError::InvalidInput(
                "retain_until must be in the future (allowing 5s clock skew)".into(),
            ));
        }

        let overlay_key = self.overlay_key(uid, created_at)?;

        if self.overlay_backend.exists(&overlay_key).await? {
            if let Some(existing) = self.overlay_backend.object_lock_get(&overlay_key).await? {
                if retain_until.timestamp() < existing {
                    return Err(DesArcError::InvalidInput(format!(
                        "retain_until must not precede the existing retention deadline ({existing})"
                    )));
                }
            }
            self.overlay_backend.object_lock_set(&overlay_key, retain_until.timestamp()).await?;
            return Ok(RetentionAction::Updated);
        }

        let loc = locate(uid, created_at, self.n_bits)?;
        let (payload, _index) = get_cold(self.shard_backend.as_ref(), &loc.object_key, &self.bigfiles_prefix, uid).await?;

        self.overlay_backend.put(&overlay_key, Bytes::from(payload)).await?;
        self.overlay_backend.object_lock_set(&overlay_key, retain_until.timestamp()).await?;
        Ok(RetentionAction::Moved)
    }
}
