//! Quality tier resolution and per-tier pricing.
//!
//! Maps a caller tier and an optional requested quality to fully resolved
//! generation parameters. The mapping is pure and total: the same inputs
//! always resolve to the same parameters, which the key builder relies on
//! for digest determinism.

use serde::{Deserialize, Serialize};

/// Commercial tier of the caller issuing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
    Pro,
}

impl Tier {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pro" | "high" => Self::Pro,
            "premium" | "mid" => Self::Premium,
            _ => Self::Free,
        }
    }

    /// Highest quality this tier may resolve to.
    fn ceiling(&self) -> ResolvedQuality {
        match self {
            Self::Free => ResolvedQuality::Standard,
            Self::Premium => ResolvedQuality::Premium,
            Self::Pro => ResolvedQuality::Ultra,
        }
    }
}

/// Fully resolved quality level, ordered from cheapest to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedQuality {
    Standard,
    Premium,
    Ultra,
}

impl ResolvedQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Premium => "premium",
            Self::Ultra => "ultra",
        }
    }

    /// Provider cost per 1000 units at this quality, in USD.
    pub fn unit_rate_per_1k(&self) -> f64 {
        match self {
            Self::Standard => 0.015,
            Self::Premium => 0.030,
            Self::Ultra => 0.060,
        }
    }
}

/// Resolved generation parameters fed to both the synthesizer and the
/// key builder. No field may be left as a "default" placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityParams {
    pub quality: ResolvedQuality,
    pub model: String,
    pub stability: f32,
    pub similarity: f32,
    pub speed: f32,
}

impl QualityParams {
    /// Estimated provider cost for `unit_count` units at these parameters.
    pub fn estimate_cost(&self, unit_count: u32) -> f64 {
        (unit_count as f64 / 1000.0) * self.quality.unit_rate_per_1k()
    }
}

/// Pure tier → parameter policy.
///
/// | tier | resolved quality | model | stability |
/// |------|------------------|-------|-----------|
/// | free | standard | tts-lite | 0.40 |
/// | premium | premium | tts-1 | 0.65 |
/// | pro | ultra | tts-1-hd | 0.90 |
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityPolicy;

impl QualityPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the effective parameters for a caller.
    ///
    /// A requested quality above the tier's ceiling is clamped down; below,
    /// it is honored (a pro caller may ask for standard to save cost).
    pub fn resolve(&self, tier: Tier, requested: Option<ResolvedQuality>) -> QualityParams {
        let quality = match requested {
            Some(q) => q.min(tier.ceiling()),
            None => tier.ceiling(),
        };
        match quality {
            ResolvedQuality::Standard => QualityParams {
                quality,
                model: "tts-lite".to_string(),
                stability: 0.40,
                similarity: 0.55,
                speed: 1.1,
            },
            ResolvedQuality::Premium => QualityParams {
                quality,
                model: "tts-1".to_string(),
                stability: 0.65,
                similarity: 0.75,
                speed: 1.0,
            },
            ResolvedQuality::Ultra => QualityParams {
                quality,
                model: "tts-1-hd".to_string(),
                stability: 0.90,
                similarity: 0.90,
                speed: 1.0,
            },
        }
    }
}
