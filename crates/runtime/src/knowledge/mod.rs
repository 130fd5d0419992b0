//! Knowledge auto-connection: role-biased discovery, bounded parallel
//! fetch and weighted synthesis.
//!
//! The pipeline is the only concurrent part of the runtime. Failures
//! inside it are downgraded to per-source results; the phase engine
//! always gets a `SynthesisResult` back, never an error.

use serde::{Deserialize, Serialize};

pub mod pipeline;
pub mod synthesis;

pub use pipeline::{AutoConnectionPipeline, ContentFetcher, FetchOutcome, HttpContentFetcher};
pub use synthesis::{synthesize, weight_label, word_overlap_similarity};

/// Outcome of fetching one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiFetchResult {
    /// Hostname of the fetched endpoint.
    pub source: String,
    /// Response body, truncated to the configured excerpt length.
    pub data: String,
    /// Deterministic quality estimate in [0, 1].
    pub confidence: f64,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiFetchResult {
    /// A failed result with zero confidence and a reason.
    pub fn failure(source: impl Into<String>, duration_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            data: String::new(),
            confidence: 0.0,
            success: false,
            duration_ms,
            error: Some(reason.into()),
        }
    }
}

/// A detected disagreement between two retained sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub source_a: String,
    pub source_b: String,
    /// Word-overlap similarity that triggered the flag.
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisMetadata {
    pub total: usize,
    pub successful: usize,
    pub avg_confidence: f64,
    pub processing_time_ms: u64,
}

/// Final product of a knowledge run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub synthesized_content: String,
    pub overall_confidence: f64,
    pub sources_used: Vec<String>,
    pub contradictions: Vec<Contradiction>,
    pub metadata: SynthesisMetadata,
}

impl SynthesisResult {
    pub fn succeeded(&self) -> bool {
        self.overall_confidence > 0.0 && !self.sources_used.is_empty()
    }
}

/// Confidence for one HTTP response, per the frozen scoring table:
/// base 0.5; +0.3 for 200, +0.2 for other 2xx, −0.2 otherwise; +0.2 for
/// bodies over 100 chars, +0.1 over 10; +0.1 under 1s, −0.1 over 5s;
/// clamped to [0, 1].
pub fn score_confidence(status: u16, body_len: usize, duration_ms: u64) -> f64 {
    let mut confidence: f64 = 0.5;

    if status == 200 {
        confidence += 0.3;
    } else if (200..300).contains(&status) {
        confidence += 0.2;
    } else {
        confidence -= 0.2;
    }

    if body_len > 100 {
        confidence += 0.2;
    } else if body_len > 10 {
        confidence += 0.1;
    }

    if duration_ms < 1_000 {
        confidence += 0.1;
    } else if duration_ms > 5_000 {
        confidence -= 0.1;
    }

    confidence.clamp(0.0, 1.0)
}
