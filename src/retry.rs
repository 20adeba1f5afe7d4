//! Retry policy shared by every range GET (`spec.md` §4.7, §7).
//!
//! Exponential backoff: base 50ms, factor 2, cap 2s, max 3 attempts. Only
//! `DesArcError::Backend` is retried — `NotFound` and `CorruptShard` are
//! terminal and returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::DesArcError;

const BASE_DELAY: Duration = Duration::from_millis(50);
const MAX_DELAY: Duration = Duration::from_secs(2);
const MAX_ATTEMPTS: u32 = 3;

pub async fn with_backend_retry<F, Fut, T>(mut op: F) -> Result<T, DesArcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DesArcError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(DesArcError::Backend(msg)) => {
                attempt += 1;
                if attempt >= MAX_ATTEMPTS {
                    return Err(DesArcError::Backend(msg));
                }
                let delay = BASE_DELAY * 2u32.pow(attempt - 1);
                tokio::time::sleep(delay.min(MAX_DELAY)).await;
            }
            Err(other) => return Err(other),
        }
    }
}
