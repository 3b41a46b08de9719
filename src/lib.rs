//! # voxcache
//!
//! 语音合成结果的内容寻址缓存：以确定性哈希去重昂贵的 TTS 生成调用。
//!
//! Content-addressable generation cache for text-to-speech pipelines. Sits in
//! front of an expensive, rate-limited speech provider and collapses
//! redundant work: canonical request hashing, singleflight get-or-generate
//! dispatch, sentence-aware chunking, predictive prefetch, and hit/miss cost
//! accounting.
//!
//! ## Core Guarantees
//!
//! - **Determinism**: byte-identical normalized text, voice, and resolved
//!   quality parameters always hash to the same key.
//! - **Singleflight**: at most one provider call is in flight per key,
//!   regardless of concurrent demand; all callers for a key receive the
//!   identical result.
//! - **Isolation**: a failed generation is broadcast to every waiter and the
//!   key is immediately eligible for a fresh attempt.
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Caller-facing facade ([`SpeechCache`]) and usage reports |
//! | [`dispatcher`] | Singleflight get-or-generate core with per-key leases |
//! | [`key`] | Canonical request hashing |
//! | [`chunker`] | Sentence-aware input splitting |
//! | [`quality`] | Tier → generation parameter policy and pricing |
//! | [`store`] | Asset store seam and in-memory reference backend |
//! | [`synth`] | Speech provider seam and bundled HTTP adapter |
//! | [`prefetch`] | Predictive low-priority background generation |
//! | [`ledger`] | Append-only hit/miss cost accounting |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voxcache::{GenerationRequest, MemoryStore, SpeechCache, Tier};
//! use voxcache::synth::HttpSynthesizer;
//!
//! #[tokio::main]
//! async fn main() -> voxcache::Result<()> {
//!     let synthesizer = HttpSynthesizer::builder().api_key("sk-...").build()?;
//!     let cache = SpeechCache::builder()
//!         .store(Arc::new(MemoryStore::new()))
//!         .synthesizer(Arc::new(synthesizer))
//!         .build()?;
//!
//!     let request = GenerationRequest::new("Hello world.", "alloy", Tier::Free);
//!     let asset = cache.resolve(&request).await?;
//!     println!("audio at {}", asset.blob_reference);
//!     Ok(())
//! }
//! ```

pub mod chunker;
pub mod client;
pub mod dispatcher;
pub mod key;
pub mod ledger;
pub mod prefetch;
pub mod quality;
pub mod request;
pub mod store;
pub mod synth;

// Re-export main types for convenience
pub use client::{SpeechCache, SpeechCacheBuilder, UsageReport};
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats};
pub use key::{CacheKey, KeyBuilder};
pub use ledger::{EventKind, UsageEvent, UsageLedger};
pub use prefetch::{PrefetchConfig, Prefetcher, RequestCatalog};
pub use quality::{QualityParams, QualityPolicy, ResolvedQuality, Tier};
pub use request::{GenerationRequest, GenerationRequestBuilder, Scope};
pub use store::{Asset, AssetStore, MemoryStore, NullStore, PutOutcome};
pub use synth::{SpeechSynthesizer, Synthesis};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, ProviderErrorKind};
