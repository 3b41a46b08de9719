//! Shared test doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use voxcache::chunker::word_count;
use voxcache::quality::QualityParams;
use voxcache::synth::{SpeechSynthesizer, Synthesis};
use voxcache::{Error, ProviderErrorKind, Result};

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Synthesizer double: counts invocations, optionally sleeps, optionally
/// fails a configurable range of calls.
pub struct FakeSynthesizer {
    calls: AtomicUsize,
    delay: Duration,
    /// The first n calls fail.
    fail_first: usize,
    /// Calls with 0-based index >= n fail.
    fail_from: Option<usize>,
}

impl FakeSynthesizer {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail_first: 0,
            fail_from: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn failing_from(mut self, n: usize) -> Self {
        self.fail_from = Some(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(
        &self,
        chunks: &[String],
        _voice: &str,
        params: &QualityParams,
    ) -> Result<Synthesis> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if index < self.fail_first || self.fail_from.map_or(false, |n| index >= n) {
            return Err(Error::provider(
                ProviderErrorKind::Quota,
                "simulated quota exhaustion",
            ));
        }
        let text = chunks.concat();
        let units = word_count(&text);
        Ok(Synthesis {
            audio: Bytes::from(text.into_bytes()),
            duration_seconds: units as f64 * 0.35,
            unit_count: units,
            cost: params.estimate_cost(units),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
