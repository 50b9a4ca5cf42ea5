//! Claim-based duplicate suppression for message handlers.
//!
//! The queue delivers at least once. Handlers that must act at most once per
//! message claim a key (for example the message's deduplication id) before
//! processing. The claim is released again only when processing failed in a
//! way that may succeed on redelivery; after success, or after an
//! unrecoverable failure, the claim stays and later duplicates are skipped.

use crate::error::{MessageError, ServiceError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;

/// Run `process` if `claim` succeeds, releasing the claim on recoverable failure
///
/// Returns `Ok(None)` without running `process` when the claim is already
/// held. Processing errors are converted into [`MessageError::Retry`] or
/// [`MessageError::Unrecoverable`] according to their recoverable flag; a
/// recoverable failure calls `release` exactly once before returning.
pub async fn dedupe_and_process<T, Process, ProcessFut, Claim, ClaimFut, Release, ReleaseFut>(
    process: Process,
    claim: Claim,
    release: Release,
) -> Result<Option<T>, MessageError>
where
    Process: FnOnce() -> ProcessFut,
    ProcessFut: Future<Output = Result<T, ServiceError>>,
    Claim: FnOnce() -> ClaimFut,
    ClaimFut: Future<Output = Result<bool, ServiceError>>,
    Release: FnOnce() -> ReleaseFut,
    ReleaseFut: Future<Output = Result<(), ServiceError>>,
{
    if !claim().await? {
        debug!("Claim already held, skipping duplicate message");
        return Ok(None);
    }

    match process().await {
        Ok(value) => Ok(Some(value)),
        Err(error) => {
            if error.recoverable {
                if let Err(release_error) = release().await {
                    warn!(error = %release_error, "Failed to release message claim");
                }
            }
            Err(error.into())
        }
    }
}

/// Key-value store offering set-if-absent and delete
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Take `key` for `ttl`; `false` when it is already held
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, ServiceError>;

    async fn release(&self, key: &str) -> Result<(), ServiceError>;
}

/// [`dedupe_and_process`] with the claim held in `store` under `key`
pub async fn process_once<T, Process, ProcessFut>(
    store: &dyn ClaimStore,
    key: &str,
    ttl: Duration,
    process: Process,
) -> Result<Option<T>, MessageError>
where
    Process: FnOnce() -> ProcessFut,
    ProcessFut: Future<Output = Result<T, ServiceError>>,
{
    dedupe_and_process(
        process,
        || store.claim(key, ttl),
        || store.release(key),
    )
    .await
}

/// Process-local [`ClaimStore`] with per-key expiry
#[derive(Debug, Default)]
pub struct InMemoryClaimStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, key: &str) -> bool {
        self.entries()
            .get(key)
            .is_some_and(|expires_at| *expires_at > Instant::now())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, ServiceError> {
        let now = Instant::now();
        let mut entries = self.entries();
        entries.retain(|_, expires_at| *expires_at > now);

        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), now + ttl);
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<(), ServiceError> {
        self.entries().remove(key);
        Ok(())
    }
}
