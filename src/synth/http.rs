//! HTTP speech provider.

use super::{SpeechSynthesizer, Synthesis};
use crate::chunker::word_count;
use crate::quality::QualityParams;
use crate::{Error, ProviderErrorKind, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

/// Nominal speaking rate used to estimate audio duration from word count.
const WORDS_PER_MINUTE: f64 = 170.0;

/// Speech synthesizer backed by an OpenAI-compatible audio endpoint.
///
/// Posts one request per chunk and concatenates the returned audio in order.
pub struct HttpSynthesizer {
    http_client: reqwest::Client,
    base_url: String,
    endpoint_path: String,
    api_key: String,
}

impl std::fmt::Debug for HttpSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSynthesizer")
            .field("base_url", &self.base_url)
            .field("endpoint_path", &self.endpoint_path)
            .field("api_key", &"***")
            .finish()
    }
}

impl HttpSynthesizer {
    pub fn builder() -> HttpSynthesizerBuilder {
        HttpSynthesizerBuilder::new()
    }

    async fn synthesize_chunk(
        &self,
        text: &str,
        voice: &str,
        params: &QualityParams,
    ) -> Result<Bytes> {
        let endpoint = format!("{}{}", self.base_url.trim_end_matches('/'), self.endpoint_path);
        let body = serde_json::json!({
            "model": params.model,
            "input": text,
            "voice": voice,
            "speed": params.speed,
            "stability": params.stability,
            "similarity": params.similarity,
        });
        let response = self
            .http_client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::provider(
                    ProviderErrorKind::Network,
                    format!("synthesis request failed: {}", e),
                )
            })?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            Error::provider(
                ProviderErrorKind::Network,
                format!("failed to read synthesis response: {}", e),
            )
        })?;
        if !status.is_success() {
            let body_str = String::from_utf8_lossy(&bytes);
            let kind = match status.as_u16() {
                402 | 429 => ProviderErrorKind::Quota,
                s if s >= 500 => ProviderErrorKind::Network,
                _ => ProviderErrorKind::MalformedOutput,
            };
            return Err(Error::provider(
                kind,
                format!("provider returned {}: {}", status, body_str),
            ));
        }
        if bytes.is_empty() {
            return Err(Error::provider(
                ProviderErrorKind::MalformedOutput,
                "provider returned empty audio",
            ));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(
        &self,
        chunks: &[String],
        voice: &str,
        params: &QualityParams,
    ) -> Result<Synthesis> {
        let mut audio = BytesMut::new();
        let mut units = 0u32;
        for chunk in chunks {
            let bytes = self.synthesize_chunk(chunk, voice, params).await?;
            audio.extend_from_slice(&bytes);
            units += word_count(chunk);
        }
        let duration_seconds = units as f64 * 60.0 / WORDS_PER_MINUTE / params.speed as f64;
        let cost = params.estimate_cost(units);
        Ok(Synthesis {
            audio: audio.freeze(),
            duration_seconds,
            unit_count: units,
            cost,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

pub struct HttpSynthesizerBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    endpoint_path: Option<String>,
    timeout_secs: u64,
}

impl HttpSynthesizerBuilder {
    pub fn new() -> Self {
        Self {
            api_key: None,
            base_url: None,
            endpoint_path: None,
            timeout_secs: 60,
        }
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = Some(path.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<HttpSynthesizer> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("TTS_API_KEY").ok())
            .ok_or_else(|| Error::configuration("API key required"))?;
        let base_url = self
            .base_url
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let endpoint_path = self
            .endpoint_path
            .unwrap_or_else(|| "/v1/audio/speech".to_string());
        let endpoint_path = if endpoint_path.starts_with('/') {
            endpoint_path
        } else {
            format!("/{}", endpoint_path)
        };
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(HttpSynthesizer {
            http_client,
            base_url,
            endpoint_path,
            api_key,
        })
    }
}

impl Default for HttpSynthesizerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
