//! Badness score aggregation from multiple signals.
//!
//! Each signal maps to [0, 1] with higher meaning worse; the score is their
//! weighted average. Signals with no data (missing evals) sit at the neutral
//! 0.5 so an unannotated trace is neither rewarded nor punished.

use crate::models::{BadnessScore, TraceFeatures};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default p95 latency normalizer when a batch has no positive latencies.
pub const DEFAULT_P95_LATENCY_MS: f64 = 30_000.0;

/// Error count at which the error signal saturates.
const ERROR_SIGNAL_CAP: f64 = 3.0;

/// Configurable weights for badness signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BadnessWeights {
    /// Weight of the inverted quality eval.
    pub quality_eval: f64,
    /// Weight of the inverted grounding eval.
    pub grounding_eval: f64,
    /// Weight of the tool failure rate.
    pub tool_errors: f64,
    /// Weight of the normalized latency.
    pub latency: f64,
    /// Weight of the error count.
    pub error_count: f64,
}

impl Default for BadnessWeights {
    fn default() -> Self {
        Self {
            quality_eval: 0.3,
            grounding_eval: 0.2,
            tool_errors: 0.2,
            latency: 0.1,
            error_count: 0.2,
        }
    }
}

impl BadnessWeights {
    /// Returns the weights keyed by signal name.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("quality_eval".to_string(), self.quality_eval),
            ("grounding_eval".to_string(), self.grounding_eval),
            ("tool_errors".to_string(), self.tool_errors),
            ("latency".to_string(), self.latency),
            ("error_count".to_string(), self.error_count),
        ])
    }
}

/// Computes the aggregate badness score for one trace.
///
/// `p95_latency_ms` is the batch-level normalizer for the latency signal.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_badness(
    features: &TraceFeatures,
    p95_latency_ms: f64,
    weights: &BadnessWeights,
) -> BadnessScore {
    let mut signals = BTreeMap::new();

    // Evals invert: low quality means high badness. Neutral when missing.
    signals.insert(
        "quality_eval".to_string(),
        features.quality_score.map_or(0.5, |q| 1.0 - q),
    );
    signals.insert(
        "grounding_eval".to_string(),
        features.grounding_score.map_or(0.5, |g| 1.0 - g),
    );

    signals.insert("tool_errors".to_string(), 1.0 - features.tool_success_rate);

    let latency = if features.total_latency_ms > 0.0 && p95_latency_ms > 0.0 {
        (features.total_latency_ms / p95_latency_ms).min(1.0)
    } else {
        0.0
    };
    signals.insert("latency".to_string(), latency);

    let error_signal = if features.error_count > 0 {
        (features.error_count as f64 / ERROR_SIGNAL_CAP).min(1.0)
    } else {
        0.0
    };
    signals.insert("error_count".to_string(), error_signal);

    let weight_map = weights.to_map();
    let total_weight: f64 = signals
        .keys()
        .map(|name| weight_map.get(name).copied().unwrap_or(0.0))
        .sum();

    let score = if total_weight > 0.0 {
        signals
            .iter()
            .map(|(name, value)| value * weight_map.get(name).copied().unwrap_or(0.0))
            .sum::<f64>()
            / total_weight
    } else {
        0.5
    };

    BadnessScore {
        trace_id: features.trace_id.clone(),
        score,
        signals,
    }
}

/// Computes the p95 total latency across a batch.
///
/// Only positive latencies participate; an empty set falls back to
/// [`DEFAULT_P95_LATENCY_MS`].
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn compute_p95_latency(features: &[TraceFeatures]) -> f64 {
    let mut latencies: Vec<f64> = features
        .iter()
        .map(|f| f.total_latency_ms)
        .filter(|&l| l > 0.0)
        .collect();

    if latencies.is_empty() {
        return DEFAULT_P95_LATENCY_MS;
    }

    latencies.sort_by(f64::total_cmp);
    let index = ((latencies.len() as f64 * 0.95) as usize).min(latencies.len() - 1);
    latencies[index]
}

/// Computes badness scores for a batch of traces.
///
/// The p95 latency normalizer is derived from the batch itself.
#[must_use]
pub fn compute_badness_batch(
    features: &[TraceFeatures],
    weights: &BadnessWeights,
) -> BTreeMap<String, BadnessScore> {
    let p95 = compute_p95_latency(features);
    features
        .iter()
        .map(|f| (f.trace_id.clone(), compute_badness(f, p95, weights)))
        .collect()
}

/// Returns trace IDs whose score exceeds the threshold, in map order.
#[must_use]
pub fn get_bad_trace_ids(
    scores: &BTreeMap<String, BadnessScore>,
    threshold: f64,
) -> Vec<String> {
    scores
        .iter()
        .filter(|(_, s)| s.score > threshold)
        .map(|(id, _)| id.clone())
        .collect()
}
