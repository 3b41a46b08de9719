//! Caller-facing facade.

use crate::dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats};
use crate::ledger::UsageLedger;
use crate::prefetch::{PrefetchConfig, Prefetcher, RequestCatalog};
use crate::request::GenerationRequest;
use crate::store::{Asset, AssetStore};
use crate::synth::SpeechSynthesizer;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Aggregate usage figures for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub scope: String,
    pub hit_rate: f64,
    pub total_saved: f64,
    pub total_incurred: f64,
    /// Assets currently cached that were first generated for this scope.
    pub cached_assets: usize,
}

/// High-level entry point: get-or-generate with singleflight, accounting,
/// and optional predictive prefetch.
pub struct SpeechCache {
    dispatcher: Arc<Dispatcher>,
    prefetcher: Option<Prefetcher>,
    ledger: Arc<UsageLedger>,
    store: Arc<dyn AssetStore>,
}

impl SpeechCache {
    pub fn builder() -> SpeechCacheBuilder {
        SpeechCacheBuilder::new()
    }

    /// Resolve a request, blocking until a hit is served or a fresh
    /// generation completes. A successful resolution is indistinguishable to
    /// the caller whether it was a hit or a miss.
    pub async fn resolve(&self, request: &GenerationRequest) -> Result<Asset> {
        let asset = self.dispatcher.resolve(request).await?;
        if let Some(ref prefetcher) = self.prefetcher {
            prefetcher.observe(request);
        }
        Ok(asset)
    }

    /// Aggregate usage for a scope: ledger figures plus the number of assets
    /// the store currently holds for it.
    pub async fn report_usage(&self, scope: &str) -> Result<UsageReport> {
        let cached_assets = self.store.query_by_scope(scope).await?.len();
        Ok(UsageReport {
            scope: scope.to_string(),
            hit_rate: self.ledger.hit_rate(scope),
            total_saved: self.ledger.total_saved(scope),
            total_incurred: self.ledger.total_incurred(scope),
            cached_assets,
        })
    }

    pub fn stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    pub fn ledger(&self) -> &UsageLedger {
        self.dispatcher.ledger()
    }

    /// Drain the prefetch lane and stop its workers. Foreground resolution
    /// keeps working afterwards.
    pub async fn shutdown(&mut self) {
        if let Some(prefetcher) = self.prefetcher.take() {
            prefetcher.shutdown().await;
        }
    }
}

pub struct SpeechCacheBuilder {
    store: Option<Arc<dyn AssetStore>>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    config: DispatcherConfig,
    catalog: Option<Arc<dyn RequestCatalog>>,
    prefetch_config: PrefetchConfig,
}

impl SpeechCacheBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            synthesizer: None,
            config: DispatcherConfig::default(),
            catalog: None,
            prefetch_config: PrefetchConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn AssetStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable predictive prefetch backed by the given catalog.
    pub fn prefetch(mut self, catalog: Arc<dyn RequestCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn prefetch_config(mut self, config: PrefetchConfig) -> Self {
        self.prefetch_config = config;
        self
    }

    pub fn build(self) -> Result<SpeechCache> {
        let store = self
            .store
            .ok_or_else(|| Error::configuration("an asset store is required"))?;
        let synthesizer = self
            .synthesizer
            .ok_or_else(|| Error::configuration("a speech synthesizer is required"))?;
        let ledger = Arc::new(UsageLedger::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            synthesizer,
            Arc::clone(&ledger),
            self.config,
        ));
        let prefetcher = self
            .catalog
            .map(|catalog| Prefetcher::new(Arc::clone(&dispatcher), catalog, self.prefetch_config));
        Ok(SpeechCache {
            dispatcher,
            prefetcher,
            ledger,
            store,
        })
    }
}

impl Default for SpeechCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}
