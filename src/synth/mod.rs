//! Generation adapter seam.
//!
//! Wraps the external text-to-speech provider behind a trait the dispatcher
//! owns. The provider is slow (seconds), fallible, and billable on every
//! accepted request; the dispatcher guarantees it is never invoked twice
//! concurrently for the same key.

mod http;

pub use http::{HttpSynthesizer, HttpSynthesizerBuilder};

use crate::quality::QualityParams;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Output of one synthesis call, chunks already concatenated in order.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub audio: Bytes,
    pub duration_seconds: f64,
    pub unit_count: u32,
    /// Provider cost actually charged for this call, in USD.
    pub cost: f64,
}

/// External speech provider.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize the ordered chunks of one logical text under fully
    /// resolved parameters. Implementations concatenate per-chunk audio so
    /// callers see one opaque result.
    async fn synthesize(
        &self,
        chunks: &[String],
        voice: &str,
        params: &QualityParams,
    ) -> Result<Synthesis>;

    fn name(&self) -> &'static str;
}
