//! In-memory store backends.

use super::{unix_now, Asset, AssetStore, PutOutcome};
use crate::key::CacheKey;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

struct StoredAsset {
    asset: Asset,
    audio: Bytes,
}

/// In-memory asset store. Reference implementation and test backend.
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, StoredAsset>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetch the audio blob behind a reference. Not part of the core seam;
    /// the cache only hands references around.
    pub fn blob(&self, blob_reference: &str) -> Option<Bytes> {
        self.entries
            .read()
            .unwrap()
            .values()
            .find(|e| e.asset.blob_reference == blob_reference)
            .map(|e| e.audio.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Asset>> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .get(key.as_str())
            .map(|e| e.asset.clone()))
    }

    async fn put(&self, asset: Asset, audio: Bytes) -> Result<PutOutcome> {
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(asset.key.as_str()) {
            return Ok(PutOutcome::Conflict);
        }
        entries.insert(asset.key.hash.clone(), StoredAsset { asset, audio });
        Ok(PutOutcome::Inserted)
    }

    async fn touch(&self, key: &CacheKey) -> Result<()> {
        if let Some(entry) = self.entries.write().unwrap().get_mut(key.as_str()) {
            entry.asset.access_count += 1;
            entry.asset.last_accessed_at = unix_now();
        }
        Ok(())
    }

    async fn query_by_scope(&self, collection_id: &str) -> Result<Vec<Asset>> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .values()
            .filter(|e| e.asset.collection_id.as_deref() == Some(collection_id))
            .map(|e| e.asset.clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// No-op store: every lookup misses, every write is dropped. Useful for
/// disabling caching without touching call sites.
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetStore for NullStore {
    async fn get(&self, _: &CacheKey) -> Result<Option<Asset>> {
        Ok(None)
    }
    async fn put(&self, _: Asset, _: Bytes) -> Result<PutOutcome> {
        Ok(PutOutcome::Inserted)
    }
    async fn touch(&self, _: &CacheKey) -> Result<()> {
        Ok(())
    }
    async fn query_by_scope(&self, _: &str) -> Result<Vec<Asset>> {
        Ok(Vec::new())
    }
    fn name(&self) -> &'static str {
        "null"
    }
}
