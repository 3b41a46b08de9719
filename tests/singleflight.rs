//! Singleflight dispatcher properties: one provider call per key under
//! concurrency, identical fan-out, failure isolation, accounting.

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::FakeSynthesizer;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;
use voxcache::{
    Asset, AssetStore, CacheKey, Dispatcher, DispatcherConfig, Error, GenerationRequest,
    MemoryStore, PutOutcome, Result, Scope, Tier, UsageLedger,
};

fn build_dispatcher(
    synth: Arc<FakeSynthesizer>,
    store: Arc<dyn AssetStore>,
    config: DispatcherConfig,
) -> Arc<Dispatcher> {
    let ledger = Arc::new(UsageLedger::new());
    Arc::new(Dispatcher::new(store, synth, ledger, config))
}

fn scoped_request(text: &str, collection: &str, unit: u32) -> GenerationRequest {
    GenerationRequest::new(text, "v1", Tier::Free)
        .with_scope(Scope::new(collection).with_unit(unit))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_requests_generate_once() {
    common::init_tracing();
    let synth = Arc::new(FakeSynthesizer::new().with_delay(Duration::from_millis(50)));
    let store = Arc::new(MemoryStore::new());
    let dispatcher = build_dispatcher(synth.clone(), store, DispatcherConfig::default());

    let request = GenerationRequest::new("Hello world. Second sentence.", "v1", Tier::Free);
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            let request = request.clone();
            tokio::spawn(async move { dispatcher.resolve(&request).await })
        })
        .collect();

    let assets: Vec<Asset> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(synth.calls(), 1, "provider must be invoked exactly once");
    for asset in &assets[1..] {
        assert_eq!(asset.key, assets[0].key);
        assert_eq!(asset.blob_reference, assets[0].blob_reference);
    }
    assert_eq!(dispatcher.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_concurrent_callers_record_one_miss_one_hit() {
    let synth = Arc::new(FakeSynthesizer::new().with_delay(Duration::from_millis(50)));
    let store = Arc::new(MemoryStore::new());
    let dispatcher = build_dispatcher(synth.clone(), store, DispatcherConfig::default());

    let request = scoped_request("Hello world. Second sentence.", "course-1", 0);
    let (a, b) = tokio::join!(
        {
            let d = Arc::clone(&dispatcher);
            let r = request.clone();
            tokio::spawn(async move { d.resolve(&r).await })
        },
        {
            let d = Arc::clone(&dispatcher);
            let r = request.clone();
            tokio::spawn(async move { d.resolve(&r).await })
        }
    );
    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();

    assert_eq!(a.blob_reference, b.blob_reference);
    assert_eq!(synth.calls(), 1);
    let ledger = dispatcher.ledger();
    assert_eq!(ledger.len(), 2);
    assert!((ledger.hit_rate("course-1") - 0.5).abs() < 1e-9);
    assert!(ledger.total_incurred("course-1") > 0.0);
    assert!(
        (ledger.total_saved("course-1") - ledger.total_incurred("course-1")).abs() < 1e-9,
        "the hit saves exactly what the miss cost"
    );
}

#[tokio::test]
async fn hits_touch_access_stats_and_ledger() {
    let synth = Arc::new(FakeSynthesizer::new());
    let store = Arc::new(MemoryStore::new());
    let dispatcher = build_dispatcher(
        synth.clone(),
        store.clone(),
        DispatcherConfig::default(),
    );

    let request = scoped_request("Hello world. Second sentence.", "course-1", 0);
    let first = dispatcher.resolve(&request).await.unwrap();
    for _ in 0..3 {
        dispatcher.resolve(&request).await.unwrap();
    }

    let stored = store.get(&first.key).await.unwrap().unwrap();
    assert_eq!(stored.access_count, 3, "one touch per subsequent hit");
    assert_eq!(synth.calls(), 1);
    assert!((dispatcher.ledger().hit_rate("course-1") - 0.75).abs() < 1e-9);

    let stats = dispatcher.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.generated, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failure_reaches_all_waiters_and_key_stays_retryable() {
    let synth = Arc::new(
        FakeSynthesizer::new()
            .with_delay(Duration::from_millis(50))
            .failing_first(1),
    );
    let store = Arc::new(MemoryStore::new());
    let dispatcher = build_dispatcher(synth.clone(), store, DispatcherConfig::default());

    let request = GenerationRequest::new("Doomed sentence.", "v1", Tier::Free);
    let (a, b) = tokio::join!(
        {
            let d = Arc::clone(&dispatcher);
            let r = request.clone();
            tokio::spawn(async move { d.resolve(&r).await })
        },
        {
            let d = Arc::clone(&dispatcher);
            let r = request.clone();
            tokio::spawn(async move { d.resolve(&r).await })
        }
    );
    let a = a.unwrap();
    let b = b.unwrap();

    let err_a = a.unwrap_err();
    let err_b = b.unwrap_err();
    assert_eq!(err_a.to_string(), err_b.to_string());
    assert!(matches!(err_a, Error::Provider { .. }));
    assert_eq!(synth.calls(), 1, "failure must not trigger hidden retries");
    assert_eq!(dispatcher.in_flight(), 0, "no stuck lease after failure");

    // A fresh attempt starts cleanly and succeeds.
    let asset = dispatcher.resolve(&request).await.unwrap();
    assert_eq!(synth.calls(), 2);
    assert!(!asset.blob_reference.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_leaseholder_frees_the_key() {
    let synth = Arc::new(FakeSynthesizer::new().with_delay(Duration::from_millis(100)));
    let store = Arc::new(MemoryStore::new());
    let dispatcher = build_dispatcher(synth.clone(), store, DispatcherConfig::default());

    let request = GenerationRequest::new("Abandoned sentence.", "v1", Tier::Free);
    let handle = {
        let d = Arc::clone(&dispatcher);
        let r = request.clone();
        tokio::spawn(async move { d.resolve(&r).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    handle.abort();
    let _ = handle.await;

    assert_eq!(
        dispatcher.in_flight(),
        0,
        "cancelling the holder must destroy the lease"
    );

    // A fresh caller is never blocked behind the abandoned attempt.
    let asset = tokio::time::timeout(Duration::from_secs(1), dispatcher.resolve(&request))
        .await
        .expect("resolve must not block on an abandoned lease")
        .unwrap();
    assert!(!asset.blob_reference.is_empty());
    assert_eq!(synth.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn joined_waiters_register_as_accesses() {
    let synth = Arc::new(FakeSynthesizer::new().with_delay(Duration::from_millis(50)));
    let store = Arc::new(MemoryStore::new());
    let dispatcher = build_dispatcher(synth.clone(), store.clone(), DispatcherConfig::default());

    let request = GenerationRequest::new("Shared sentence.", "v1", Tier::Free);
    let (a, b) = tokio::join!(
        {
            let d = Arc::clone(&dispatcher);
            let r = request.clone();
            tokio::spawn(async move { d.resolve(&r).await })
        },
        {
            let d = Arc::clone(&dispatcher);
            let r = request.clone();
            tokio::spawn(async move { d.resolve(&r).await })
        }
    );
    let a = a.unwrap().unwrap();
    b.unwrap().unwrap();

    // Ledger hits and access statistics agree: the second caller counts as
    // one access whether it joined the lease or hit the store afterwards.
    let stored = store.get(&a.key).await.unwrap().unwrap();
    assert_eq!(stored.access_count, 1);
    assert_eq!(synth.calls(), 1);
    assert_eq!(dispatcher.ledger().len(), 2);
}

#[tokio::test]
async fn generation_timeout_is_broadcast_and_lease_destroyed() {
    let synth = Arc::new(FakeSynthesizer::new().with_delay(Duration::from_millis(200)));
    let store = Arc::new(MemoryStore::new());
    let config = DispatcherConfig::default().with_generation_timeout(Duration::from_millis(50));
    let dispatcher = build_dispatcher(synth.clone(), store, config);

    let request = GenerationRequest::new("Slow sentence.", "v1", Tier::Free);
    let err = dispatcher.resolve(&request).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(dispatcher.in_flight(), 0);

    // The key is immediately eligible for a fresh attempt.
    let err = dispatcher.resolve(&request).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert_eq!(synth.calls(), 2);
}

#[tokio::test]
async fn distinct_keys_do_not_serialize() {
    let synth = Arc::new(FakeSynthesizer::new());
    let store = Arc::new(MemoryStore::new());
    let dispatcher = build_dispatcher(synth.clone(), store, DispatcherConfig::default());

    let a = GenerationRequest::new("First text.", "v1", Tier::Free);
    let b = GenerationRequest::new("Second text.", "v1", Tier::Free);
    let (ra, rb) = tokio::join!(dispatcher.resolve(&a), dispatcher.resolve(&b));
    let ra = assert_ok!(ra);
    let rb = assert_ok!(rb);
    assert_ne!(ra.key, rb.key);
    assert_eq!(synth.calls(), 2);
}

#[tokio::test]
async fn empty_text_is_rejected_before_any_io() {
    let synth = Arc::new(FakeSynthesizer::new());
    let store = Arc::new(MemoryStore::new());
    let dispatcher = build_dispatcher(synth.clone(), store, DispatcherConfig::default());

    let request = GenerationRequest::new("  \n\t ", "v1", Tier::Free);
    let err = dispatcher.resolve(&request).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));
    assert_eq!(synth.calls(), 0);
    assert!(dispatcher.ledger().is_empty());
}

/// Store whose every operation fails, for degraded-mode behavior.
struct DownStore;

#[async_trait]
impl AssetStore for DownStore {
    async fn get(&self, _: &CacheKey) -> Result<Option<Asset>> {
        Err(Error::store("connection refused"))
    }
    async fn put(&self, _: Asset, _: Bytes) -> Result<PutOutcome> {
        Err(Error::store("connection refused"))
    }
    async fn touch(&self, _: &CacheKey) -> Result<()> {
        Err(Error::store("connection refused"))
    }
    async fn query_by_scope(&self, _: &str) -> Result<Vec<Asset>> {
        Err(Error::store("connection refused"))
    }
    fn name(&self) -> &'static str {
        "down"
    }
}

#[tokio::test]
async fn unavailable_store_degrades_to_generation() {
    let synth = Arc::new(FakeSynthesizer::new());
    let dispatcher = build_dispatcher(synth.clone(), Arc::new(DownStore), DispatcherConfig::default());

    let request = GenerationRequest::new("Hello world.", "v1", Tier::Free);
    // get fails -> treated as miss; put fails -> logged, asset still served.
    let asset = dispatcher.resolve(&request).await.unwrap();
    assert!(asset.blob_reference.starts_with("blob/"));
    assert_eq!(synth.calls(), 1);

    // Nothing was cached, so the same key generates again.
    dispatcher.resolve(&request).await.unwrap();
    assert_eq!(synth.calls(), 2);
}

/// Store that loses every put race: inserts a rival record for the same key
/// and reports `Conflict`.
struct RacingStore {
    inner: MemoryStore,
}

#[async_trait]
impl AssetStore for RacingStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Asset>> {
        self.inner.get(key).await
    }
    async fn put(&self, asset: Asset, audio: Bytes) -> Result<PutOutcome> {
        let mut rival = asset;
        rival.blob_reference = "blob-rival".to_string();
        self.inner.put(rival, audio).await?;
        Ok(PutOutcome::Conflict)
    }
    async fn touch(&self, key: &CacheKey) -> Result<()> {
        self.inner.touch(key).await
    }
    async fn query_by_scope(&self, collection_id: &str) -> Result<Vec<Asset>> {
        self.inner.query_by_scope(collection_id).await
    }
    fn name(&self) -> &'static str {
        "racing"
    }
}

#[tokio::test]
async fn put_conflict_is_treated_as_success() {
    let synth = Arc::new(FakeSynthesizer::new());
    let store = Arc::new(RacingStore {
        inner: MemoryStore::new(),
    });
    let dispatcher = build_dispatcher(synth.clone(), store, DispatcherConfig::default());

    let request = GenerationRequest::new("Raced sentence.", "v1", Tier::Free);
    let asset = dispatcher.resolve(&request).await.unwrap();
    // The racing writer's record is served; the content is equivalent by key.
    assert_eq!(asset.blob_reference, "blob-rival");
    assert_eq!(synth.calls(), 1);

    // Subsequent resolutions hit the stored record.
    let again = dispatcher.resolve(&request).await.unwrap();
    assert_eq!(again.blob_reference, "blob-rival");
    assert_eq!(synth.calls(), 1);
}
