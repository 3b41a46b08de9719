//! Generation request model.

use crate::quality::{ResolvedQuality, Tier};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};

/// Logical position of a request inside the application's content model.
///
/// Feeds prefetch prediction and usage accounting only; never hashed into
/// the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub collection_id: String,
    pub unit_index: Option<u32>,
}

impl Scope {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            unit_index: None,
        }
    }

    pub fn with_unit(mut self, index: u32) -> Self {
        self.unit_index = Some(index);
        self
    }
}

/// Immutable description of one synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub text: String,
    pub voice: String,
    pub tier: Tier,
    pub requested_quality: Option<ResolvedQuality>,
    pub scope: Option<Scope>,
}

impl GenerationRequest {
    pub fn builder() -> GenerationRequestBuilder {
        GenerationRequestBuilder::new()
    }

    /// Convenience constructor for the common case.
    pub fn new(text: impl Into<String>, voice: impl Into<String>, tier: Tier) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            tier,
            requested_quality: None,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }
}

pub struct GenerationRequestBuilder {
    text: Option<String>,
    voice: Option<String>,
    tier: Tier,
    requested_quality: Option<ResolvedQuality>,
    scope: Option<Scope>,
}

impl GenerationRequestBuilder {
    pub fn new() -> Self {
        Self {
            text: None,
            voice: None,
            tier: Tier::Free,
            requested_quality: None,
            scope: None,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn requested_quality(mut self, quality: ResolvedQuality) -> Self {
        self.requested_quality = Some(quality);
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn build(self) -> Result<GenerationRequest> {
        let text = self.text.ok_or_else(|| {
            Error::invalid_request_with_context(
                "text is required",
                ErrorContext::new().with_field_path("request.text"),
            )
        })?;
        let voice = self.voice.ok_or_else(|| {
            Error::invalid_request_with_context(
                "voice is required",
                ErrorContext::new().with_field_path("request.voice"),
            )
        })?;
        if voice.trim().is_empty() {
            return Err(Error::invalid_request_with_context(
                "voice must not be empty",
                ErrorContext::new().with_field_path("request.voice"),
            ));
        }
        Ok(GenerationRequest {
            text,
            voice,
            tier: self.tier,
            requested_quality: self.requested_quality,
            scope: self.scope,
        })
    }
}

impl Default for GenerationRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
