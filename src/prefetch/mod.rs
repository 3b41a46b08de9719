//! Predictive background prefetch.
//!
//! Watches completed foreground requests and speculatively resolves the next
//! units of the same collection ahead of demand. Jobs flow through a bounded
//! queue into a fixed pool of workers, so prefetch can never starve
//! foreground traffic or blow the provider quota; when the queue is full new
//! predictions are dropped, not delayed. Workers re-enter the normal resolve
//! path, so a prediction that is already cached costs one store lookup and
//! zero provider calls.
//!
//! Prefetch failures are logged and swallowed; they are never surfaced to the
//! caller whose request triggered the prediction.

use crate::dispatcher::Dispatcher;
use crate::request::GenerationRequest;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Source of truth for what text a predicted unit would synthesize.
///
/// The cache cannot invent future inputs; the application supplies them
/// through this seam (a lesson table, a chapter list, ...). Returning `None`
/// means the unit does not exist and the prediction is silently discarded.
#[async_trait]
pub trait RequestCatalog: Send + Sync {
    async fn request_for(&self, collection_id: &str, unit_index: u32) -> Option<GenerationRequest>;
}

#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    /// How many units past the completed one to predict.
    pub lookahead: u32,
    /// Worker count; the hard cap on simultaneous low-priority generations.
    pub workers: usize,
    /// Queue capacity; predictions beyond it are dropped.
    pub queue_capacity: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            lookahead: 2,
            workers: 2,
            queue_capacity: 32,
        }
    }
}

impl PrefetchConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_lookahead(mut self, lookahead: u32) -> Self {
        self.lookahead = lookahead;
        self
    }
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

#[derive(Debug, Clone)]
struct PrefetchJob {
    collection_id: String,
    unit_index: u32,
}

/// Background prefetch lane: bounded queue plus worker pool.
pub struct Prefetcher {
    tx: mpsc::Sender<PrefetchJob>,
    lookahead: u32,
    workers: Vec<JoinHandle<()>>,
}

impl Prefetcher {
    /// Spawn the worker pool against a shared dispatcher and catalog.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        catalog: Arc<dyn RequestCatalog>,
        config: PrefetchConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<PrefetchJob>(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let dispatcher = Arc::clone(&dispatcher);
                let catalog = Arc::clone(&catalog);
                tokio::spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else { break };
                        let request = catalog
                            .request_for(&job.collection_id, job.unit_index)
                            .await;
                        match request {
                            Some(request) => match dispatcher.resolve(&request).await {
                                Ok(_) => debug!(
                                    worker_id,
                                    collection = %job.collection_id,
                                    unit = job.unit_index,
                                    "prefetch resolved"
                                ),
                                Err(e) => warn!(
                                    worker_id,
                                    collection = %job.collection_id,
                                    unit = job.unit_index,
                                    error = %e,
                                    "prefetch failed"
                                ),
                            },
                            None => debug!(
                                collection = %job.collection_id,
                                unit = job.unit_index,
                                "predicted unit does not exist"
                            ),
                        }
                    }
                })
            })
            .collect();
        Self {
            tx,
            lookahead: config.lookahead,
            workers,
        }
    }

    /// Observe a completed request and enqueue predicted successors.
    ///
    /// Never blocks: a full queue drops the prediction. Returns how many jobs
    /// were actually enqueued.
    pub fn observe(&self, request: &GenerationRequest) -> usize {
        let Some(ref scope) = request.scope else {
            return 0;
        };
        let Some(unit) = scope.unit_index else {
            return 0;
        };
        let Some(first) = unit.checked_add(1) else {
            return 0;
        };
        let mut enqueued = 0;
        for next in first..=unit.saturating_add(self.lookahead) {
            let job = PrefetchJob {
                collection_id: scope.collection_id.clone(),
                unit_index: next,
            };
            match self.tx.try_send(job) {
                Ok(()) => enqueued += 1,
                Err(TrySendError::Full(job)) => {
                    debug!(
                        collection = %job.collection_id,
                        unit = job.unit_index,
                        "prefetch queue full, dropping prediction"
                    );
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
        enqueued
    }

    /// Stop accepting jobs and wait for in-flight prefetches to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.await;
        }
    }
}
