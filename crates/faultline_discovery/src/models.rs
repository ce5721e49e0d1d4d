//! Data model for the discovery pipeline.
//!
//! Every entity here is immutable once produced: a run extracts features,
//! scores them, and assembles a fresh report. Clusters and slices refer to
//! traces by opaque ID only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Badness threshold above which a trace counts as bad.
pub const BAD_THRESHOLD: f64 = 0.5;

/// Feature representation of one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFeatures {
    /// Opaque trace identifier.
    pub trace_id: String,

    /// Root-span input text.
    pub input_text: String,
    /// Root-span output text.
    pub output_text: String,

    /// Dense text embedding; absent when the provider is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_embedding: Option<Vec<f64>>,

    /// Tool names ordered by span start time.
    pub tool_sequence: Vec<String>,
    /// Tool n-gram counts (unigrams plus `"a->b"` bigrams).
    pub tool_ngrams: BTreeMap<String, u32>,
    /// 1 − (failed tool spans / tool spans); 1.0 when no tool spans exist.
    pub tool_success_rate: f64,
    /// Number of distinct tools used.
    pub unique_tools_used: usize,

    /// End-to-end latency of the trace in milliseconds.
    pub total_latency_ms: f64,
    /// Summed latency of LLM spans in milliseconds.
    pub llm_latency_ms: f64,
    /// Summed latency of tool spans in milliseconds.
    pub tool_latency_ms: f64,
    /// Total LLM tokens consumed.
    pub total_tokens: u64,
    /// Number of LLM spans.
    pub llm_calls: usize,
    /// Number of tool spans.
    pub tool_calls: usize,
    /// Number of spans with ERROR status.
    pub error_count: usize,

    /// Derived intent attribute (for slicing).
    pub intent: String,
    /// Derived route attribute (for slicing).
    pub route: String,
    /// Model name attribute (for slicing).
    pub model: String,
    /// Provider name attribute (for slicing).
    pub provider: String,
    /// Prompt version attribute (for slicing).
    pub prompt_version: String,

    /// Quality eval score in [0, 1], when annotated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    /// Grounding eval score in [0, 1], when annotated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_score: Option<f64>,
}

impl TraceFeatures {
    /// Creates a feature record with neutral defaults for the given trace.
    #[must_use]
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            input_text: String::new(),
            output_text: String::new(),
            text_embedding: None,
            tool_sequence: Vec::new(),
            tool_ngrams: BTreeMap::new(),
            tool_success_rate: 1.0,
            unique_tools_used: 0,
            total_latency_ms: 0.0,
            llm_latency_ms: 0.0,
            tool_latency_ms: 0.0,
            total_tokens: 0,
            llm_calls: 0,
            tool_calls: 0,
            error_count: 0,
            intent: "unknown".to_string(),
            route: "unknown".to_string(),
            model: "unknown".to_string(),
            provider: "unknown".to_string(),
            prompt_version: "unknown".to_string(),
            quality_score: None,
            grounding_score: None,
        }
    }

    /// Looks up a categorical attribute by name.
    ///
    /// Unrecognized names resolve to `"unknown"`, matching the default of
    /// every categorical field.
    #[must_use]
    pub fn attribute(&self, name: &str) -> &str {
        match name {
            "intent" => &self.intent,
            "route" => &self.route,
            "model" => &self.model,
            "provider" => &self.provider,
            "prompt_version" => &self.prompt_version,
            _ => "unknown",
        }
    }
}

/// Aggregated badness score for one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadnessScore {
    /// Opaque trace identifier.
    pub trace_id: String,
    /// Aggregate score: 0.0 (good) to 1.0 (bad).
    pub score: f64,
    /// Per-signal values before weighting.
    pub signals: BTreeMap<String, f64>,
}

impl BadnessScore {
    /// Whether this trace is considered bad.
    #[must_use]
    pub fn is_bad(&self) -> bool {
        self.score > BAD_THRESHOLD
    }
}

/// One behavioral cluster of traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    /// Cluster label (non-negative; the noise label never appears here).
    pub cluster_id: usize,
    /// Member trace IDs, in input order.
    pub trace_ids: Vec<String>,
    /// Number of members.
    pub size: usize,
    /// Fraction of members with a bad score.
    pub badness_rate: f64,
    /// Mean member score.
    pub avg_badness: f64,

    /// Plurality intent among members.
    pub dominant_intent: String,
    /// Plurality route among members.
    pub dominant_route: String,
    /// Plurality model among members.
    pub dominant_model: String,

    /// Up to five members closest to the centroid.
    pub example_trace_ids: Vec<String>,
    /// Cluster centroid in scaled feature space.
    pub centroid: Vec<f64>,
}

impl ClusterResult {
    /// Whether this cluster has a high badness rate.
    #[must_use]
    pub fn is_problematic(&self) -> bool {
        self.badness_rate > 0.3
    }
}

/// A trace subset defined by a conjunction of attribute values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    /// Attribute name/value pairs, in attribute-list order.
    pub attributes: Vec<(String, String)>,
    /// Member trace IDs, in input order.
    pub trace_ids: Vec<String>,
    /// Number of members.
    pub size: usize,
    /// Fraction of members with a bad score.
    pub badness_rate: f64,
    /// Population badness rate this slice is compared against.
    pub baseline_rate: f64,
    /// `badness_rate / baseline_rate`.
    pub lift: f64,
    /// Significance of the rate difference.
    pub p_value: f64,
}

impl Slice {
    /// Whether the slice's badness rate differs significantly from baseline.
    #[must_use]
    pub fn is_significant(&self) -> bool {
        self.p_value < 0.05
    }

    /// Renders the attribute conjunction as `"k=v, k=v"`.
    #[must_use]
    pub fn attribute_str(&self) -> String {
        self.attributes
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Full output of one discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Project the run analyzed.
    pub project: String,
    /// Analyzed time window.
    pub time_range: (DateTime<Utc>, DateTime<Utc>),
    /// Number of traces with extracted features.
    pub total_traces: usize,
    /// Mean badness score over all traces.
    pub baseline_badness: f64,

    /// Clusters, sorted by badness rate descending.
    pub clusters: Vec<ClusterResult>,
    /// Top slices (at most 20), sorted by lift descending.
    pub top_slices: Vec<Slice>,

    /// When the report was produced.
    pub generated_at: DateTime<Utc>,

    /// Number of traces with a bad score.
    pub num_bad_traces: usize,
    /// Number of clusters found.
    pub num_clusters: usize,
    /// Number of significant slices among the top slices.
    pub num_significant_slices: usize,
}

impl DiscoveryReport {
    /// Assembles a report, computing the derived summary counts.
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        time_range: (DateTime<Utc>, DateTime<Utc>),
        total_traces: usize,
        baseline_badness: f64,
        clusters: Vec<ClusterResult>,
        top_slices: Vec<Slice>,
        num_bad_traces: usize,
    ) -> Self {
        let num_clusters = clusters.len();
        let num_significant_slices = top_slices.iter().filter(|s| s.is_significant()).count();
        Self {
            project: project.into(),
            time_range,
            total_traces,
            baseline_badness,
            clusters,
            top_slices,
            generated_at: Utc::now(),
            num_bad_traces,
            num_clusters,
            num_significant_slices,
        }
    }

    /// The cluster with the highest badness rate, if any.
    ///
    /// Ties keep the earliest cluster in report order.
    #[must_use]
    pub fn worst_cluster(&self) -> Option<&ClusterResult> {
        self.clusters.iter().fold(None, |best, cluster| match best {
            Some(b) if cluster.badness_rate <= b.badness_rate => best,
            _ => Some(cluster),
        })
    }

    /// The slice with the highest lift, if any.
    ///
    /// Ties keep the earliest slice in report order.
    #[must_use]
    pub fn worst_slice(&self) -> Option<&Slice> {
        self.top_slices.iter().fold(None, |best, slice| match best {
            Some(b) if slice.lift <= b.lift => best,
            _ => Some(slice),
        })
    }

    /// Returns a human-readable multi-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Discovery Report for {}", self.project),
            format!(
                "Time range: {} to {}",
                self.time_range.0, self.time_range.1
            ),
            format!("Total traces: {}", self.total_traces),
            format!("Baseline badness: {:.1}%", self.baseline_badness * 100.0),
            format!("Clusters found: {}", self.num_clusters),
            format!("Significant slices: {}", self.num_significant_slices),
        ];

        if let Some(cluster) = self.worst_cluster() {
            lines.push(format!(
                "Worst cluster: #{} ({:.1}% bad, {} traces)",
                cluster.cluster_id,
                cluster.badness_rate * 100.0,
                cluster.size
            ));
        }

        if let Some(slice) = self.worst_slice() {
            lines.push(format!(
                "Worst slice: {} (lift={:.2}x)",
                slice.attribute_str(),
                slice.lift
            ));
        }

        lines.join("\n")
    }
}
