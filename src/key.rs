//! Canonical cache key generation.
//!
//! A key is the SHA-256 of canonical JSON over the request's semantic inputs:
//! normalized text, voice, and fully resolved quality parameters. Scope
//! identifiers are deliberately excluded so the same sentence cached for one
//! collection is a hit for every other.

use crate::quality::QualityParams;
use crate::request::GenerationRequest;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Content-addressed cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
    pub voice: Option<String>,
    pub model: Option<String>,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            voice: None,
            model: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Collapse whitespace runs into single spaces and trim the ends.
///
/// Spoken content is untouched otherwise: no case folding, no punctuation
/// rewriting.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic key builder. Pure, no I/O.
pub struct KeyBuilder {
    salt: Option<String>,
}

impl KeyBuilder {
    pub fn new() -> Self {
        Self { salt: None }
    }

    /// Namespace keys, e.g. to segregate environments sharing one store.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// Build the key for a request under fully resolved parameters.
    ///
    /// Fails if the text is empty after normalization; a request that hashes
    /// nothing must never reach the store.
    pub fn build(&self, request: &GenerationRequest, params: &QualityParams) -> Result<CacheKey> {
        let normalized = normalize_text(&request.text);
        if normalized.is_empty() {
            return Err(Error::invalid_request_with_context(
                "text is empty after normalization",
                ErrorContext::new()
                    .with_field_path("request.text")
                    .with_source("key_builder"),
            ));
        }

        let mut parts: BTreeMap<&str, String> = BTreeMap::new();
        parts.insert("text", normalized);
        parts.insert("voice", request.voice.clone());
        parts.insert("model", params.model.clone());
        parts.insert("quality", params.quality.as_str().to_string());
        parts.insert("stability", format!("{:.2}", params.stability));
        parts.insert("similarity", format!("{:.2}", params.similarity));
        parts.insert("speed", format!("{:.2}", params.speed));
        if let Some(ref s) = self.salt {
            parts.insert("salt", s.clone());
        }

        let canonical = serde_json::to_string(&parts).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash: String = hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect();

        Ok(CacheKey::new(hash)
            .with_voice(&request.voice)
            .with_model(&params.model))
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
