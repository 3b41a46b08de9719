//! Asset store seam.
//!
//! The cache core treats persistence as an injected key-value collaborator:
//! one record per asset keyed by the content hash, plus an opaque blob
//! reference the core never dereferences. [`MemoryStore`] is the reference
//! implementation; production deployments supply their own backend.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Asset`] | Persisted metadata for one cached synthesis |
//! | [`AssetStore`] | Trait for pluggable storage backends |
//! | [`PutOutcome`] | First-writer-wins insert result |
//! | [`MemoryStore`] | In-memory reference backend |
//! | [`NullStore`] | No-op backend for disabling caching |

mod memory;

pub use memory::{MemoryStore, NullStore};

use crate::key::CacheKey;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Persisted record for one cached synthesis.
///
/// Created exactly once per key by the dispatcher on a miss; afterwards only
/// the access statistics move. Eviction, if any, belongs to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub key: CacheKey,
    /// Opaque handle to the synthesized audio; resolved by the backend.
    pub blob_reference: String,
    pub duration_seconds: f64,
    pub unit_count: u32,
    pub created_at: u64,
    pub access_count: u64,
    pub last_accessed_at: u64,
    /// Provider cost charged when this asset was generated, in USD.
    pub generation_cost: f64,
    /// Collection this asset was first generated for; accounting only.
    pub collection_id: Option<String>,
}

impl Asset {
    pub fn new(
        key: CacheKey,
        blob_reference: impl Into<String>,
        duration_seconds: f64,
        unit_count: u32,
        generation_cost: f64,
    ) -> Self {
        let now = unix_now();
        Self {
            key,
            blob_reference: blob_reference.into(),
            duration_seconds,
            unit_count,
            created_at: now,
            access_count: 0,
            last_accessed_at: now,
            generation_cost,
            collection_id: None,
        }
    }

    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }
}

/// Result of a [`AssetStore::put`].
///
/// `Conflict` means a racing writer inserted the same key first. The content
/// is equivalent by construction (same key, same inputs), so callers treat it
/// as success and re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Conflict,
}

/// Storage backend consumed by the dispatcher and the usage reports.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Look up an asset by content hash.
    async fn get(&self, key: &CacheKey) -> Result<Option<Asset>>;

    /// Insert an asset and its audio blob. First writer wins; an existing
    /// record for the key yields [`PutOutcome::Conflict`] and leaves the
    /// stored record untouched.
    async fn put(&self, asset: Asset, audio: Bytes) -> Result<PutOutcome>;

    /// Record a hit: bump `access_count` and `last_accessed_at`.
    async fn touch(&self, key: &CacheKey) -> Result<()>;

    /// All assets first generated for a collection; used by usage reports.
    async fn query_by_scope(&self, collection_id: &str) -> Result<Vec<Asset>>;

    fn name(&self) -> &'static str;
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
