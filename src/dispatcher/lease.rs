//! Sharded per-key lease table.
//!
//! A lease is the exclusivity token for one in-flight generation: at most one
//! lease exists per key at any instant. Shards keep unrelated keys off each
//! other's lock; critical sections only touch the map, never await.

use crate::key::CacheKey;
use crate::store::Asset;
use crate::{Error, ProviderErrorKind};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{trace, warn};

pub(crate) type LeaseResult = Result<Asset, Error>;
pub(crate) type WaiterSender = oneshot::Sender<LeaseResult>;
pub(crate) type WaiterReceiver = oneshot::Receiver<LeaseResult>;

/// In-flight generation for one key.
struct Lease {
    /// Completion channels in arrival order.
    waiters: Vec<WaiterSender>,
    started_at: Instant,
}

/// Outcome of asking the table for a key.
pub(crate) enum Entry<'a> {
    /// Caller now holds the lease and must run the generation.
    Created(LeaseGuard<'a>),
    /// Another caller holds the lease; await the receiver for its result.
    Joined(WaiterReceiver),
}

/// Exclusivity token held by the caller running a generation.
///
/// `complete` destroys the lease and notifies waiters with the result.
/// Dropping the guard without completing means the holder's future was
/// cancelled; the lease is destroyed anyway and waiters receive an error, so
/// no key is ever left wedged behind a generation nobody is driving.
pub(crate) struct LeaseGuard<'a> {
    table: &'a LeaseTable,
    key: Option<CacheKey>,
}

impl LeaseGuard<'_> {
    /// Destroy the lease and notify its waiters in FIFO order.
    ///
    /// Returns the number of waiters notified. A waiter that dropped its
    /// receiver (cancelled) is skipped silently; the generation still ran to
    /// completion for everyone else.
    pub fn complete(mut self, result: &LeaseResult) -> usize {
        match self.key.take() {
            Some(key) => self.table.complete(&key, result),
            None => 0,
        }
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            warn!(key = %key, "lease holder dropped before completion");
            self.table.complete(
                &key,
                &Err(Error::provider(
                    ProviderErrorKind::Network,
                    "generation was cancelled before completion",
                )),
            );
        }
    }
}

pub(crate) struct LeaseTable {
    shards: Vec<Mutex<HashMap<String, Lease>>>,
}

impl LeaseTable {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    fn shard(&self, key: &CacheKey) -> &Mutex<HashMap<String, Lease>> {
        let mut hasher = DefaultHasher::new();
        key.as_str().hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Atomically join an existing lease or create a fresh one.
    pub fn join_or_create(&self, key: &CacheKey) -> Entry<'_> {
        let mut shard = self.shard(key).lock().unwrap();
        match shard.get_mut(key.as_str()) {
            Some(lease) => {
                let (tx, rx) = oneshot::channel();
                lease.waiters.push(tx);
                Entry::Joined(rx)
            }
            None => {
                shard.insert(
                    key.hash.clone(),
                    Lease {
                        waiters: Vec::new(),
                        started_at: Instant::now(),
                    },
                );
                Entry::Created(LeaseGuard {
                    table: self,
                    key: Some(key.clone()),
                })
            }
        }
    }

    fn complete(&self, key: &CacheKey, result: &LeaseResult) -> usize {
        let lease = self.shard(key).lock().unwrap().remove(key.as_str());
        match lease {
            Some(lease) => {
                trace!(
                    key = %key,
                    held_ms = lease.started_at.elapsed().as_millis() as u64,
                    waiters = lease.waiters.len(),
                    "lease destroyed"
                );
                let count = lease.waiters.len();
                for tx in lease.waiters {
                    let _ = tx.send(result.clone());
                }
                count
            }
            None => 0,
        }
    }

    /// Number of keys currently leased, across all shards.
    pub fn active(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }
}
