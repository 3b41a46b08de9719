//! Singleflight dispatcher: the concurrency core of the cache.
//!
//! Collapses concurrent identical requests into one provider call. Per key
//! the flow is: store lookup (hit fast path) → atomically join or create a
//! lease → the lease holder runs chunking and synthesis, writes the asset,
//! and fans the result out to every waiter in arrival order.
//!
//! ## Invariant
//!
//! For any key, at most one synthesizer invocation is in flight at any
//! instant, no matter how many concurrent callers request that key. Cancelled
//! waiters never cancel the underlying generation; the cache still benefits
//! from its completion. A cancelled lease holder destroys its lease on drop
//! and its waiters receive an error, leaving the key immediately retryable.

mod lease;

use crate::chunker::chunk;
use crate::key::{CacheKey, KeyBuilder};
use crate::ledger::{UsageLedger, UNSCOPED};
use crate::quality::{QualityParams, QualityPolicy};
use crate::request::GenerationRequest;
use crate::store::{Asset, AssetStore, PutOutcome};
use crate::synth::SpeechSynthesizer;
use crate::{Error, ProviderErrorKind, Result};
use lease::{Entry, LeaseTable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Dispatcher tuning knobs.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum characters per synthesis chunk; 0 disables chunking.
    pub max_chunk_units: usize,
    /// Wall-clock budget for one generation, chunks included.
    pub generation_timeout: Duration,
    /// Shard count for the lease table.
    pub lease_shards: usize,
    /// Optional key namespace (e.g. to segregate environments).
    pub key_salt: Option<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_chunk_units: 4096,
            generation_timeout: Duration::from_secs(120),
            lease_shards: 16,
            key_salt: None,
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_chunk_units(mut self, units: usize) -> Self {
        self.max_chunk_units = units;
        self
    }
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }
    pub fn with_lease_shards(mut self, shards: usize) -> Self {
        self.lease_shards = shards;
        self
    }
    pub fn with_key_salt(mut self, salt: impl Into<String>) -> Self {
        self.key_salt = Some(salt.into());
        self
    }
}

/// Point-in-time dispatcher counters.
#[derive(Debug, Clone, Default)]
pub struct DispatcherStats {
    /// Store hits served on the fast path.
    pub hits: u64,
    /// Misses that acquired a lease.
    pub misses: u64,
    /// Callers that joined an existing lease instead of generating.
    pub joined: u64,
    /// Successful synthesizer invocations.
    pub generated: u64,
    /// Failed or timed-out generations.
    pub failures: u64,
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    joined: AtomicU64,
    generated: AtomicU64,
    failures: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            joined: AtomicU64::new(0),
            generated: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
    fn to_stats(&self) -> DispatcherStats {
        DispatcherStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            generated: self.generated.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Atomic get-or-generate dispatch over an injected store and synthesizer.
pub struct Dispatcher {
    config: DispatcherConfig,
    store: Arc<dyn AssetStore>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    policy: QualityPolicy,
    key_builder: KeyBuilder,
    ledger: Arc<UsageLedger>,
    leases: LeaseTable,
    stats: AtomicStats,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn AssetStore>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        ledger: Arc<UsageLedger>,
        config: DispatcherConfig,
    ) -> Self {
        let key_builder = match config.key_salt {
            Some(ref salt) => KeyBuilder::new().with_salt(salt.clone()),
            None => KeyBuilder::new(),
        };
        let leases = LeaseTable::new(config.lease_shards);
        Self {
            config,
            store,
            synthesizer,
            policy: QualityPolicy::new(),
            key_builder,
            ledger,
            leases,
            stats: AtomicStats::new(),
        }
    }

    /// Resolve a request to a cached or freshly generated asset.
    ///
    /// Blocks until a hit is served, an in-flight generation for the same key
    /// completes, or this caller's own generation finishes. All callers
    /// waiting on one key receive the identical result, success or failure.
    pub async fn resolve(&self, request: &GenerationRequest) -> Result<Asset> {
        let params = self.policy.resolve(request.tier, request.requested_quality);
        let key = self.key_builder.build(request, &params)?;
        let scope = scope_label(request);

        // Hit fast path: no lease is taken for a lookup.
        match self.store.get(&key).await {
            Ok(Some(asset)) => {
                if let Err(e) = self.store.touch(&key).await {
                    warn!(key = %key, error = %e, "touch failed after hit");
                }
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                self.ledger.record_hit(scope, asset.generation_cost);
                debug!(key = %key, "cache hit");
                return Ok(asset);
            }
            Ok(None) => {}
            Err(e) => {
                // Availability over completeness: a broken store lookup
                // degrades to generation instead of failing the caller.
                warn!(key = %key, error = %e, "store lookup failed, treating as miss");
            }
        }

        match self.leases.join_or_create(&key) {
            Entry::Joined(rx) => {
                self.stats.joined.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "joining in-flight generation");
                match rx.await {
                    Ok(Ok(asset)) => {
                        self.ledger.record_hit(scope, asset.generation_cost);
                        if let Err(e) = self.store.touch(&asset.key).await {
                            warn!(key = %asset.key, error = %e, "touch failed after joined hit");
                        }
                        Ok(asset)
                    }
                    Ok(Err(e)) => Err(e),
                    // Leaseholder vanished without completing; a fresh
                    // resolve will retry cleanly.
                    Err(_) => Err(Error::provider(
                        ProviderErrorKind::Network,
                        "in-flight generation was abandoned",
                    )),
                }
            }
            Entry::Created(guard) => {
                let result = self.generate(&key, request, &params, scope).await;
                let notified = guard.complete(&result);
                if notified > 0 {
                    debug!(key = %key, waiters = notified, "fanned out generation result");
                }
                result
            }
        }
    }

    /// Leaseholder path: chunk, synthesize under the timeout budget, persist,
    /// account. Runs at most once per key at a time.
    async fn generate(
        &self,
        key: &CacheKey,
        request: &GenerationRequest,
        params: &QualityParams,
        scope: &str,
    ) -> std::result::Result<Asset, Error> {
        // Re-check after taking the lease: a racing writer (often prefetch)
        // may have finished between our lookup and the lease acquisition.
        if let Ok(Some(asset)) = self.store.get(key).await {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            self.ledger.record_hit(scope, asset.generation_cost);
            if let Err(e) = self.store.touch(key).await {
                warn!(key = %key, error = %e, "touch failed after hit");
            }
            debug!(key = %key, "cache hit on post-lease re-check");
            return Ok(asset);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let chunks = chunk(&request.text, self.config.max_chunk_units);
        debug!(key = %key, chunks = chunks.len(), model = %params.model, "generating");

        let started = Instant::now();
        let synthesis = match tokio::time::timeout(
            self.config.generation_timeout,
            self.synthesizer.synthesize(&chunks, &request.voice, params),
        )
        .await
        {
            Ok(Ok(synthesis)) => synthesis,
            Ok(Err(e)) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "generation failed");
                return Err(e);
            }
            Err(_) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(key = %key, elapsed_ms, "generation timed out");
                return Err(Error::Timeout { elapsed_ms });
            }
        };
        self.stats.generated.fetch_add(1, Ordering::Relaxed);

        let blob_reference = format!("blob/{}", uuid::Uuid::new_v4());
        let mut asset = Asset::new(
            key.clone(),
            blob_reference,
            synthesis.duration_seconds,
            synthesis.unit_count,
            synthesis.cost,
        );
        if let Some(ref s) = request.scope {
            asset = asset.with_collection(&s.collection_id);
        }

        match self.store.put(asset.clone(), synthesis.audio).await {
            Ok(PutOutcome::Inserted) => {}
            Ok(PutOutcome::Conflict) => {
                // Same key means same generation inputs; the stored record is
                // equivalent. Serve it so access stats stay on one row.
                debug!(key = %key, "racing writer inserted first, re-reading");
                if let Ok(Some(stored)) = self.store.get(key).await {
                    asset = stored;
                }
            }
            Err(e) => {
                // Log and serve: the caller gets its asset, the key may be
                // regenerated next time.
                error!(key = %key, error = %e, "failed to cache generated asset");
            }
        }

        self.ledger.record_miss(scope, synthesis.cost);
        Ok(asset)
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats.to_stats()
    }

    /// Number of keys with an in-flight generation right now.
    pub fn in_flight(&self) -> usize {
        self.leases.active()
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<dyn AssetStore> {
        &self.store
    }
}

fn scope_label(request: &GenerationRequest) -> &str {
    request
        .scope
        .as_ref()
        .map(|s| s.collection_id.as_str())
        .unwrap_or(UNSCOPED)
}
